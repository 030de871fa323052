//! # Test Utilities
//!
//! Deterministic collaborators for unit and integration tests.
//!
//! Only compiled for tests or with the `test-utils` feature.
//!
//! ```rust,ignore
//! use reseed_gateway::test_utils::{ManualClock, StubReseeder};
//!
//! let clock = ManualClock::new();
//! clock.advance(Duration::from_secs(3600));
//! let reseeder = StubReseeder::with_bundle(vec![0u8; 64]);
//! ```

use crate::domain::error::ReseedError;
use crate::domain::types::{Bundle, ClientAddr, PeerAssignment, RequestContext};
use crate::ports::{Clock, Reseeder};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Reseeder returning a fixed bundle, optionally failing at either step.
#[derive(Debug, Default)]
pub struct StubReseeder {
    bundle: Bundle,
    fail_peer: bool,
    fail_bundle: bool,
    peer_calls: AtomicUsize,
    bundle_calls: AtomicUsize,
    clients: Mutex<Vec<ClientAddr>>,
}

impl StubReseeder {
    pub fn with_bundle(bytes: impl Into<bytes::Bytes>) -> Self {
        Self {
            bundle: Bundle::new(bytes),
            ..Default::default()
        }
    }

    /// Fail at peer selection.
    pub fn failing_peer() -> Self {
        Self {
            fail_peer: true,
            ..Default::default()
        }
    }

    /// Select a peer but fail to produce the bundle.
    pub fn failing_bundle() -> Self {
        Self {
            fail_bundle: true,
            ..Default::default()
        }
    }

    pub fn peer_calls(&self) -> usize {
        self.peer_calls.load(Ordering::SeqCst)
    }

    pub fn bundle_calls(&self) -> usize {
        self.bundle_calls.load(Ordering::SeqCst)
    }

    /// Client addresses seen by `peer`, in call order.
    pub fn clients(&self) -> Vec<ClientAddr> {
        self.clients.lock().clone()
    }
}

#[async_trait]
impl Reseeder for StubReseeder {
    async fn peer(&self, ctx: &RequestContext) -> Result<PeerAssignment, ReseedError> {
        self.peer_calls.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().push(ctx.client_addr.clone());
        if self.fail_peer {
            return Err(ReseedError::PeerSelection("stub peer failure".into()));
        }
        Ok(PeerAssignment::new(format!("peer-{}", ctx.client_addr)))
    }

    async fn bundle_for(&self, _peer: &PeerAssignment) -> Result<Bundle, ReseedError> {
        self.bundle_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bundle {
            return Err(ReseedError::BundleUnavailable("stub bundle failure".into()));
        }
        Ok(self.bundle.clone())
    }
}
