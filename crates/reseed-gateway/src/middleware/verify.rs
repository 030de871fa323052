//! Client verification: only the expected reseed agent gets through.
//!
//! Runs before the rate limiter, so a rejected client never spends quota.

use crate::domain::error::Rejection;
use crate::domain::types::RequestContext;
use axum::{
    body::Body,
    http::{header::USER_AGENT, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::warn;

/// Agent verification layer
#[derive(Clone)]
pub struct VerifyAgentLayer {
    expected: Arc<str>,
}

impl VerifyAgentLayer {
    pub fn new(expected_agent: impl Into<String>) -> Self {
        Self {
            expected: Arc::from(expected_agent.into()),
        }
    }
}

impl<S> Layer<S> for VerifyAgentLayer {
    type Service = VerifyAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VerifyAgentService {
            inner,
            expected: Arc::clone(&self.expected),
        }
    }
}

/// Agent verification service
#[derive(Clone)]
pub struct VerifyAgentService<S> {
    inner: S,
    expected: Arc<str>,
}

impl<S> Service<Request<Body>> for VerifyAgentService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected = Arc::clone(&self.expected);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !agent_matches(&req, &expected) {
                warn!(
                    client = %RequestContext::of(&req).client_addr,
                    user_agent = ?req.headers().get(USER_AGENT),
                    "Rejecting unexpected user agent"
                );
                return Ok(Rejection::Forbidden.into_response());
            }

            inner.call(req).await
        })
    }
}

/// Exact comparison of the declared agent; a missing header never matches.
fn agent_matches<B>(req: &Request<B>, expected: &str) -> bool {
    req.headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|agent| agent == expected)
}
