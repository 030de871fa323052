//! Outbound ports for the reseed gateway.
//!
//! `Reseeder` is the only backend the pipeline talks to. Both calls are
//! failure-terminal for the request: the handler never retries them and
//! imposes no timeout, so implementations bound their own latency.

use crate::domain::error::ReseedError;
use crate::domain::types::{Bundle, PeerAssignment, RequestContext};
use async_trait::async_trait;
use std::time::Instant;

/// Selects a peer for a request and produces its bundle.
#[async_trait]
pub trait Reseeder: Send + Sync {
    /// Pick the peer assignment for an admitted request.
    async fn peer(&self, ctx: &RequestContext) -> Result<PeerAssignment, ReseedError>;

    /// Produce the complete bundle bytes for a peer assignment.
    async fn bundle_for(&self, peer: &PeerAssignment) -> Result<Bundle, ReseedError>;
}

/// Time source trait for testability
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
