//! Error types and the user-visible rejections of the pipeline.
//!
//! Only three failure classes ever reach a client: 403, 429 and 500. Their
//! bodies are fixed strings so no internal detail leaks.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;

/// Body of the 403 response
pub const FORBIDDEN_BODY: &str = "403 Forbidden";
/// Body of the 429 response
pub const RATE_LIMITED_BODY: &str = "429 Too Many Requests";
/// Body of the 500 response
pub const BACKEND_FAILURE_BODY: &str = "500 Unable to get SU3";

/// Rate limit response header names
pub mod headers {
    pub const LIMIT: &str = "x-ratelimit-limit";
    pub const REMAINING: &str = "x-ratelimit-remaining";
    pub const RESET: &str = "x-ratelimit-reset";
}

/// Terminal outcome written by a pipeline stage instead of calling the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Agent string mismatch
    Forbidden,
    /// Quota exhausted for the current window
    RateLimited {
        limit: u32,
        retry_after: Duration,
    },
    /// Reseeder failed at peer selection or bundle fetch
    BackendFailure,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Rejection::BackendFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Rejection::Forbidden => FORBIDDEN_BODY,
            Rejection::RateLimited { .. } => RATE_LIMITED_BODY,
            Rejection::BackendFailure => BACKEND_FAILURE_BODY,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.body()).into_response();

        if let Rejection::RateLimited { limit, retry_after } = self {
            let secs = ceil_secs(retry_after);
            let map = response.headers_mut();
            map.insert(header::RETRY_AFTER, HeaderValue::from(secs));
            map.insert(headers::LIMIT, HeaderValue::from(limit));
            map.insert(headers::REMAINING, HeaderValue::from(0u32));
            map.insert(headers::RESET, HeaderValue::from(secs));
        }

        response
    }
}

/// Whole seconds, rounded up so a client never retries too early.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Failures reported by a `Reseeder`.
#[derive(Debug, thiserror::Error)]
pub enum ReseedError {
    /// No peer could be selected for the request
    #[error("peer selection failed: {0}")]
    PeerSelection(String),

    /// Bundle bytes could not be produced
    #[error("bundle unavailable: {0}")]
    BundleUnavailable(String),
}

/// Gateway-level errors (startup and listener, never sent to clients)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Certificate or key material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),
}
