//! Composable fault-tolerance primitives for async services.
//!
//! Four primitives, usable alone or stacked:
//!
//! - [`CircuitBreaker`]: fail fast on a dependency that keeps failing, probe
//!   it for recovery, and close again once it behaves.
//! - [`RetryPolicy`]: retry transient failures with exponential backoff and
//!   jitter.
//! - [`rate_limit`]: per-key admission control with token-bucket,
//!   sliding-window, and fixed-window strategies.
//! - [`Bulkhead`]: cap concurrent calls to a resource, with a bounded FIFO
//!   wait queue.
//!
//! [`ResilienceStack`] composes bulkhead, breaker, and retry around a single
//! operation. Everything reports through one error type,
//! [`ResilienceError`], and an optional [`ResilienceObserver`] hook.
//!
//! ```
//! use meshguard::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new("db", CircuitBreakerConfig::default());
//! let value = breaker
//!     .execute(|| async { Ok::<_, ResilienceError<std::io::Error>>(42) })
//!     .await;
//! assert_eq!(value.unwrap(), 42);
//! # }
//! ```
//!
//! All state is in-memory and per-process; nothing survives a restart and
//! nothing is shared across instances.

#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod jitter;
pub mod observer;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod sleeper;
pub mod stack;

pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadConfigError, BulkheadMetrics};
pub use circuit_breaker::{
    BreakerConfigError, BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use clock::{Clock, MonotonicClock};
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use observer::{LogObserver, NoopObserver, ObservedEvent, RecordingObserver, ResilienceObserver};
pub use rate_limit::{
    create_rate_limiter, FixedWindow, RateLimitAlgorithm, RateLimitInfo, RateLimiter,
    RateLimiterConfig, RateLimiterConfigError, RateLimiterMetrics, SlidingWindow, TokenBucket,
};
pub use registry::{BreakerRegistry, RegistryError};
pub use retry::{
    is_transient_error, is_transient_io, is_transient_status, with_retry, RetryPolicy,
    RetryPolicyBuilder,
};
pub use sleeper::{NoopSleeper, RecordingSleeper, Sleeper, TokioSleeper};
pub use stack::{ResilienceStack, StackBuilder};

/// One-line import for the common surface.
pub mod prelude {
    pub use crate::bulkhead::{Bulkhead, BulkheadConfig};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::error::ResilienceError;
    pub use crate::rate_limit::{
        create_rate_limiter, RateLimitAlgorithm, RateLimiter, RateLimiterConfig,
    };
    pub use crate::registry::BreakerRegistry;
    pub use crate::retry::{with_retry, RetryPolicy};
    pub use crate::stack::ResilienceStack;
}
