//! Error taxonomy shared by every primitive.
//!
//! A single generic enum keeps the contract uniform: a wrapped operation's
//! own failure always travels as `Inner(E)`, and a primitive substitutes one
//! of the other variants only when the operation was never invoked (open
//! circuit, exhausted rate budget, full bulkhead) or a wrapper-imposed
//! timeout fired first. Callers branch on variants, never on messages.

use crate::circuit_breaker::CircuitState;
use crate::rate_limit::RateLimitInfo;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Unified error for calls guarded by meshguard primitives.
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The circuit breaker rejected the call without invoking the operation.
    CircuitOpen {
        /// Breaker state observed at rejection time (`Open`, or `HalfOpen`
        /// when a probe was refused).
        state: CircuitState,
        /// Consecutive failures recorded when the circuit opened.
        failure_count: usize,
        /// Time remaining until the breaker will allow a test call.
        retry_after: Duration,
    },
    /// A wrapper-imposed call timeout fired before the operation settled.
    Timeout { elapsed: Duration, timeout: Duration },
    /// Every retry attempt failed; the original failure is preserved.
    RetryExhausted {
        /// Total invocations performed (initial call + retries).
        attempts: usize,
        /// The error from the final attempt.
        last: Arc<E>,
    },
    /// The rate limiter rejected the call.
    RateLimited {
        /// Configured budget for the window.
        limit: u32,
        /// Time until at least one permit becomes available again.
        retry_after: Duration,
    },
    /// The bulkhead had no capacity and its queue was full.
    BulkheadFull { in_flight: usize, max_concurrent: usize, queued: usize, max_queue: usize },
    /// The call was queued by the bulkhead but no slot freed in time.
    BulkheadTimeout { waited: Duration, timeout: Duration },
    /// The wrapped operation itself failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { state, failure_count, retry_after } => write!(
                f,
                "circuit breaker {:?} ({} consecutive failures, retry in {:?})",
                state, failure_count, retry_after
            ),
            Self::Timeout { elapsed, timeout } => {
                write!(f, "call timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::RetryExhausted { attempts, last } => {
                write!(f, "retry exhausted after {} attempts; last error: {}", attempts, last)
            }
            Self::RateLimited { limit, retry_after } => {
                write!(f, "rate limit of {} exceeded (retry in {:?})", limit, retry_after)
            }
            Self::BulkheadFull { in_flight, max_concurrent, queued, max_queue } => write!(
                f,
                "bulkhead full ({}/{} in flight, {}/{} queued)",
                in_flight, max_concurrent, queued, max_queue
            ),
            Self::BulkheadTimeout { waited, timeout } => {
                write!(f, "bulkhead queue timeout after {:?} (limit: {:?})", waited, timeout)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Build a `RetryExhausted` from the final attempt's failure.
    pub fn retry_exhausted(attempts: usize, last: E) -> Self {
        Self::RetryExhausted { attempts, last: Arc::new(last) }
    }

    /// Build a `RateLimited` from a limiter decision.
    pub fn rate_limited(info: &RateLimitInfo) -> Self {
        Self::RateLimited { limit: info.limit, retry_after: info.reset_after }
    }

    /// Check whether the circuit breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check whether a wrapper timeout fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check whether retries were exhausted.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Check whether a rate limiter rejected the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check whether the bulkhead rejected or timed the call out.
    pub fn is_bulkhead(&self) -> bool {
        matches!(self, Self::BulkheadFull { .. } | Self::BulkheadTimeout { .. })
    }

    /// Check whether this wraps the operation's own error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Extract the operation's own error, if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the operation's own error, if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Suggested wait before trying again, for the rejection variants that
    /// carry one (`CircuitOpen`, `RateLimited`).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } | Self::RateLimited { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// `(elapsed, limit)` for timeout errors.
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, timeout } => Some((*elapsed, *timeout)),
            _ => None,
        }
    }

    /// `(attempts, last error)` for retry exhaustion.
    pub fn exhaustion_details(&self) -> Option<(usize, &E)> {
        match self {
            Self::RetryExhausted { attempts, last } => Some((*attempts, last.as_ref())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for DummyError {}

    #[test]
    fn circuit_open_display_mentions_state_and_wait() {
        let err: ResilienceError<io::Error> = ResilienceError::CircuitOpen {
            state: CircuitState::Open,
            failure_count: 5,
            retry_after: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("circuit breaker"));
        assert!(msg.contains("5"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn retry_exhausted_preserves_last_error() {
        let err = ResilienceError::retry_exhausted(4, DummyError("boom"));
        assert!(err.is_retry_exhausted());
        let (attempts, last) = err.exhaustion_details().unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(last, &DummyError("boom"));
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn bulkhead_variants_share_predicate() {
        let full: ResilienceError<DummyError> = ResilienceError::BulkheadFull {
            in_flight: 10,
            max_concurrent: 10,
            queued: 5,
            max_queue: 5,
        };
        let timeout: ResilienceError<DummyError> = ResilienceError::BulkheadTimeout {
            waited: Duration::from_secs(2),
            timeout: Duration::from_secs(2),
        };
        assert!(full.is_bulkhead());
        assert!(timeout.is_bulkhead());
        assert!(!full.is_timeout(), "bulkhead timeout is not a call timeout");
    }

    #[test]
    fn retry_after_present_only_on_rejections_with_a_deadline() {
        let limited: ResilienceError<DummyError> =
            ResilienceError::RateLimited { limit: 10, retry_after: Duration::from_millis(100) };
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(100)));

        let inner = ResilienceError::Inner(DummyError("x"));
        assert_eq!(inner.retry_after(), None);
    }

    #[test]
    fn inner_accessors_round_trip() {
        let err = ResilienceError::Inner(DummyError("oops"));
        assert!(err.is_inner());
        assert_eq!(err.as_inner(), Some(&DummyError("oops")));
        assert_eq!(err.into_inner(), Some(DummyError("oops")));
    }

    #[test]
    fn source_is_none_for_rejection_variants() {
        let err: ResilienceError<DummyError> =
            ResilienceError::RateLimited { limit: 1, retry_after: Duration::ZERO };
        assert!(err.source().is_none());
    }
}
