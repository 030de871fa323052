//! Admission limiting: a fixed number of requests per client per rolling window.
//!
//! Counters live in an LRU map capped at `max_clients` entries. When the cap is
//! reached the least recently seen client is evicted to make room, so memory is
//! bounded no matter how many distinct addresses show up. The lookup, window
//! check and increment for a key all happen under one lock, which is what keeps
//! two simultaneous requests from both taking the last unit of quota.

use crate::domain::config::RateLimitConfig;
use crate::domain::error::{ceil_secs, headers, Rejection};
use crate::domain::types::{RateKey, RequestContext};
use crate::ports::{Clock, SystemClock};
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::{IntoResponse, Response},
};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, info};

/// Requests seen from one key in its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Admitted requests in this window
    pub count: u32,
    /// When the window opened
    pub window_start: Instant,
}

impl CounterEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted
    Admitted {
        /// Requests still allowed in this window
        remaining: u32,
        /// Time until the window resets
        reset_after: Duration,
    },
    /// Quota exhausted
    Limited {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Per-client counter store shared across requests
pub struct AdmissionLimiter {
    /// Per-key counters, least recently seen evicted first
    store: Mutex<LruCache<RateKey, CounterEntry>>,
    /// Configuration
    config: RateLimitConfig,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl AdmissionLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.max_clients).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(LruCache::new(capacity)),
            config,
            clock,
        }
    }

    /// Check and record one request for `key`.
    pub fn check(&self, key: &RateKey) -> Admission {
        let now = self.clock.now();
        let limit = self.config.max_requests;
        let window = self.config.window;

        let mut store = self.store.lock();

        if let Some(entry) = store.get_mut(key) {
            let elapsed = now.saturating_duration_since(entry.window_start);

            if elapsed >= window {
                *entry = CounterEntry::new(now);
                return Admission::Admitted {
                    remaining: limit.saturating_sub(1),
                    reset_after: window,
                };
            }

            if entry.count >= limit {
                return Admission::Limited {
                    retry_after: window - elapsed,
                };
            }

            entry.count += 1;
            return Admission::Admitted {
                remaining: limit - entry.count,
                reset_after: window - elapsed,
            };
        }

        if let Some((evicted, _)) = store.push(key.clone(), CounterEntry::new(now)) {
            debug!(evicted = %evicted, admitted = %key, "Rate limit store full, evicted least recently seen client");
        }

        Admission::Admitted {
            remaining: limit.saturating_sub(1),
            reset_after: window,
        }
    }

    /// Drop entries whose window has elapsed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window;
        let mut store = self.store.lock();

        let expired: Vec<RateKey> = store
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.window_start) >= window)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.pop(key);
        }

        expired.len()
    }

    /// Current counter for a key, without touching its recency.
    pub fn entry(&self, key: &RateKey) -> Option<CounterEntry> {
        self.store.lock().peek(key).copied()
    }

    /// Get number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.store.lock().len()
    }

    pub fn limit(&self) -> u32 {
        self.config.max_requests
    }
}

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<AdmissionLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<AdmissionLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> Arc<AdmissionLimiter> {
        Arc::clone(&self.limiter)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<AdmissionLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let key = RequestContext::of(&req).rate_key();
            let limit = limiter.limit();

            match limiter.check(&key) {
                Admission::Admitted {
                    remaining,
                    reset_after,
                } => {
                    let mut response = inner.call(req).await?;
                    let map = response.headers_mut();
                    map.insert(headers::LIMIT, HeaderValue::from(limit));
                    map.insert(headers::REMAINING, HeaderValue::from(remaining));
                    map.insert(headers::RESET, HeaderValue::from(ceil_secs(reset_after)));
                    Ok(response)
                }
                Admission::Limited { retry_after } => {
                    info!(
                        client = %key,
                        limit = limit,
                        retry_after_secs = ceil_secs(retry_after),
                        "Rate limit exceeded"
                    );
                    Ok(Rejection::RateLimited { limit, retry_after }.into_response())
                }
            }
        })
    }
}

/// Background task to purge expired rate limit entries
pub async fn cleanup_task(limiter: Arc<AdmissionLimiter>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = limiter.purge_expired();
        if removed > 0 {
            debug!(
                removed = removed,
                tracked = limiter.tracked_clients(),
                "Purged expired rate limit entries"
            );
        }
    }
}
