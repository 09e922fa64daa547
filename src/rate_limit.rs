//! Per-key rate limiting with pluggable strategies.
//!
//! Three strategies share one interface: token bucket (smooth refill, allows
//! short bursts), sliding window (exact count over a rolling window), and
//! fixed window (cheapest, with the documented boundary-burst caveat). All
//! state is in-memory per process; keys are caller-defined strings such as a
//! user id or an IP.

pub mod strategies;

use crate::clock::Clock;
use crate::observer::ResilienceObserver;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use strategies::{FixedWindow, SlidingWindow, TokenBucket};

/// Outcome of a single admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RateLimitInfo {
    /// Configured maximum requests per window.
    pub limit: u32,
    /// Requests still admissible right now (floor for fractional tokens).
    pub remaining: u32,
    /// How long until capacity is available again.
    pub reset_after: Duration,
    /// Whether this request was admitted.
    pub allowed: bool,
}

/// Counter snapshot returned by [`RateLimiter::metrics`]. No side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RateLimiterMetrics {
    /// Keys currently tracked.
    pub tracked_keys: usize,
    /// Consume decisions admitted since construction.
    pub total_allowed: u64,
    /// Consume decisions rejected since construction.
    pub total_rejected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimiterConfigError {
    #[error("max_requests must be >= 1")]
    ZeroMaxRequests,
    #[error("window must be at least 1ms")]
    WindowTooShort,
}

/// Validated limiter configuration shared by all strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    max_requests: u32,
    window: Duration,
}

impl RateLimiterConfig {
    /// Windows shorter than 1ms are rejected: all strategy arithmetic runs
    /// in milliseconds, and a window that truncates to zero would disable
    /// limiting entirely.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimiterConfigError> {
        if max_requests == 0 {
            return Err(RateLimiterConfigError::ZeroMaxRequests);
        }
        if window < Duration::from_millis(1) {
            return Err(RateLimiterConfigError::WindowTooShort);
        }
        Ok(Self { max_requests, window })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub(crate) fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

impl Default for RateLimiterConfig {
    /// 100 requests per minute.
    fn default() -> Self {
        Self { max_requests: 100, window: Duration::from_secs(60) }
    }
}

/// Admission control over named keys.
///
/// Implementations are `Send + Sync` and safe to share behind an `Arc`;
/// every method takes `&self`.
pub trait RateLimiter: Send + Sync {
    /// Try to admit one request for `key`.
    fn consume(&self, key: &str) -> RateLimitInfo {
        self.consume_n(key, 1)
    }

    /// Try to admit `permits` requests for `key` atomically: all are
    /// admitted or none are.
    fn consume_n(&self, key: &str, permits: u32) -> RateLimitInfo;

    /// Forget all state for `key`, restoring its full quota.
    fn reset(&self, key: &str);

    /// Forget all keys.
    fn reset_all(&self);

    /// Drop keys that have not been seen for at least `idle_for`. Returns
    /// the number of evicted keys. Callers run this periodically to bound
    /// memory under high key cardinality.
    fn evict_idle(&self, idle_for: Duration) -> usize;

    /// Number of keys currently tracked.
    fn tracked_keys(&self) -> usize;

    /// Snapshot of cumulative admission counters. `reset`/`reset_all` clear
    /// per-key state but never these totals.
    fn metrics(&self) -> RateLimiterMetrics;

    fn config(&self) -> &RateLimiterConfig;
}

/// Strategy selector for [`create_rate_limiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAlgorithm {
    /// Continuous refill; bursts up to the bucket capacity.
    TokenBucket,
    /// Exact rolling-window count; strictest, highest memory per key.
    SlidingWindow,
    /// Counter per aligned window; cheapest, permits up to 2x the limit
    /// across a window boundary.
    FixedWindow,
}

impl std::fmt::Display for RateLimitAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitAlgorithm::TokenBucket => write!(f, "token_bucket"),
            RateLimitAlgorithm::SlidingWindow => write!(f, "sliding_window"),
            RateLimitAlgorithm::FixedWindow => write!(f, "fixed_window"),
        }
    }
}

/// Build a limiter for `algorithm` with the default clock and no observer.
pub fn create_rate_limiter(
    algorithm: RateLimitAlgorithm,
    config: RateLimiterConfig,
) -> Arc<dyn RateLimiter> {
    match algorithm {
        RateLimitAlgorithm::TokenBucket => Arc::new(TokenBucket::new(config)),
        RateLimitAlgorithm::SlidingWindow => Arc::new(SlidingWindow::new(config)),
        RateLimitAlgorithm::FixedWindow => Arc::new(FixedWindow::new(config)),
    }
}

/// As [`create_rate_limiter`], with an injected clock and observer.
pub fn create_rate_limiter_with(
    algorithm: RateLimitAlgorithm,
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ResilienceObserver>,
) -> Arc<dyn RateLimiter> {
    match algorithm {
        RateLimitAlgorithm::TokenBucket => {
            Arc::new(TokenBucket::new(config).with_shared_clock(clock).with_shared_observer(observer))
        }
        RateLimitAlgorithm::SlidingWindow => {
            Arc::new(SlidingWindow::new(config).with_shared_clock(clock).with_shared_observer(observer))
        }
        RateLimitAlgorithm::FixedWindow => {
            Arc::new(FixedWindow::new(config).with_shared_clock(clock).with_shared_observer(observer))
        }
    }
}
