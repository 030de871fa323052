//! Admission pipeline in front of the bundle handler.
//!
//! Layer order: Request → ForwardedFor → AccessLog → VerifyAgent → RateLimit → Handler
//!
//! Each stage either calls the next one or writes a complete response and
//! stops. The access log sits outside verification and rate limiting so it
//! records rejected requests too.

pub mod access_log;
pub mod forwarded;
pub mod rate_limit;
pub mod verify;

pub use access_log::{AccessLogLayer, ACCESS_LOG_TARGET};
pub use forwarded::{ForwardedConfig, ForwardedForLayer};
pub use rate_limit::{cleanup_task, Admission, AdmissionLimiter, RateLimitLayer};
pub use verify::VerifyAgentLayer;

use crate::domain::config::ReseedConfig;
use crate::domain::error::GatewayError;
use axum::http::HeaderName;
use std::sync::Arc;
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;

/// Composed pipeline; the first layer added is the outermost.
pub type PipelineLayer = ServiceBuilder<
    Stack<RateLimitLayer, Stack<VerifyAgentLayer, Stack<AccessLogLayer, Stack<ForwardedForLayer, Identity>>>>,
>;

/// Pipeline stage builder
#[derive(Clone)]
pub struct Pipeline {
    pub forwarded: ForwardedForLayer,
    pub access_log: AccessLogLayer,
    pub verify: VerifyAgentLayer,
    pub rate_limit: RateLimitLayer,
}

impl Pipeline {
    /// Create the pipeline from gateway config, sharing the given limiter.
    pub fn from_config(
        config: &ReseedConfig,
        limiter: Arc<AdmissionLimiter>,
    ) -> Result<Self, GatewayError> {
        let header = HeaderName::try_from(config.client.forwarded_header.as_str()).map_err(|e| {
            GatewayError::Config(format!(
                "invalid forwarded header {:?}: {}",
                config.client.forwarded_header, e
            ))
        })?;

        Ok(Self {
            forwarded: ForwardedForLayer::new(ForwardedConfig { header }),
            access_log: AccessLogLayer::new(),
            verify: VerifyAgentLayer::new(config.client.expected_agent.clone()),
            rate_limit: RateLimitLayer::new(limiter),
        })
    }

    /// Get the shared limiter for the cleanup task
    pub fn limiter(&self) -> Arc<AdmissionLimiter> {
        self.rate_limit.limiter()
    }

    /// Compose the stages in pipeline order.
    pub fn layer(&self) -> PipelineLayer {
        ServiceBuilder::new()
            .layer(self.forwarded.clone())
            .layer(self.access_log.clone())
            .layer(self.verify.clone())
            .layer(self.rate_limit.clone())
    }
}
