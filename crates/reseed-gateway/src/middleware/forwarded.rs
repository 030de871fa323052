//! Client address resolution behind a reverse proxy.
//!
//! The listener is only reachable through a trusted proxy, so the first value
//! of the forwarding header is taken as the client address without checking
//! its syntax or who sent it. Whatever is resolved here is what the access log
//! and the rate limiter see.

use crate::domain::types::{ClientAddr, RequestContext};
use axum::{
    body::Body,
    http::{HeaderName, Request},
    response::Response,
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::debug;

/// Forwarding header configuration
#[derive(Clone, Debug)]
pub struct ForwardedConfig {
    /// Header carrying the original client address
    pub header: HeaderName,
}

impl Default for ForwardedConfig {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static("x-forwarded-for"),
        }
    }
}

/// Address resolver layer
#[derive(Clone)]
pub struct ForwardedForLayer {
    config: Arc<ForwardedConfig>,
}

impl ForwardedForLayer {
    pub fn new(config: ForwardedConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for ForwardedForLayer {
    type Service = ForwardedForService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForwardedForService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Address resolver service
#[derive(Clone)]
pub struct ForwardedForService<S> {
    inner: S,
    config: Arc<ForwardedConfig>,
}

impl<S> Service<Request<Body>> for ForwardedForService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let ctx = resolve(&req, &self.config);
        req.extensions_mut().insert(ctx);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

/// Build the request context, rewriting the client address from the
/// forwarding header when it carries a non-empty first value.
pub fn resolve<B>(req: &Request<B>, config: &ForwardedConfig) -> RequestContext {
    let mut ctx = RequestContext::direct(req);

    // Non-ASCII bytes are decoded lossily
    let value = req
        .headers()
        .get(&config.header)
        .map(|v| String::from_utf8_lossy(v.as_bytes()));

    if let Some(addr) = value.as_deref().and_then(first_forwarded) {
        debug!(
            transport = %ctx.transport_addr,
            forwarded = addr,
            "Using forwarded client address"
        );
        ctx.client_addr = ClientAddr::new(addr);
    }

    ctx
}

/// First comma-separated token of a forwarding header value, if non-empty.
pub fn first_forwarded(value: &str) -> Option<&str> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
