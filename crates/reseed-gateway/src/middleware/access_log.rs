//! Access logging in Apache combined log format.
//!
//! Sits right after the address resolver, so every request that enters the
//! pipeline is logged with its resolved client address, including the ones
//! later rejected with 403 or 429. Lines go through `tracing` on the
//! `reseed_gateway::access` target and never fail the request.

use crate::domain::types::{ClientAddr, RequestContext};
use axum::{
    body::{Body, HttpBody},
    http::{
        header::{CONTENT_LENGTH, REFERER, USER_AGENT},
        HeaderName, Request,
    },
    response::Response,
};
use chrono::{DateTime, Local};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::info;

/// Target used for access log events
pub const ACCESS_LOG_TARGET: &str = "reseed_gateway::access";

/// Access log layer
#[derive(Clone, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

/// Access log service
#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

/// Request-side fields of one access log line
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub client: ClientAddr,
    pub time: DateTime<Local>,
    pub method: String,
    pub uri: String,
    pub version: String,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessRecord {
    fn from_request<B>(req: &Request<B>) -> Self {
        let header = |name: HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            client: RequestContext::of(req).client_addr,
            time: Local::now(),
            method: req.method().to_string(),
            uri: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string()),
            version: format!("{:?}", req.version()),
            referer: header(REFERER),
            user_agent: header(USER_AGENT),
        }
    }

    /// Render the combined log format line.
    pub fn combined_line(&self, status: u16, size: Option<u64>) -> String {
        format!(
            "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
            self.client,
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.uri,
            self.version,
            status,
            size.map_or_else(|| "-".to_string(), |s| s.to_string()),
            self.referer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }
}

impl<S> Service<Request<Body>> for AccessLogService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let record = AccessRecord::from_request(&req);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(req).await?;

            let status = response.status().as_u16();
            let size = response_size(&response);
            info!(
                target: ACCESS_LOG_TARGET,
                client = %record.client,
                method = %record.method,
                path = %record.uri,
                status = status,
                size = size,
                user_agent = record.user_agent.as_deref().unwrap_or("-"),
                referer = record.referer.as_deref().unwrap_or("-"),
                "{}",
                record.combined_line(status, size)
            );

            Ok(response)
        })
    }
}

/// Response size from `Content-Length`, else the body's exact size hint.
pub fn response_size(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}
