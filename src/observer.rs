//! Observability hooks for all primitives.
//!
//! Instead of optional callback fields checked at every call site, a single
//! listener trait with no-op defaults is injected into each primitive.
//! Implement only the methods you care about. Listener panics are shielded
//! from the call path: a misbehaving observer is logged, never propagated.

use crate::bulkhead::BulkheadMetrics;
use crate::circuit_breaker::{BreakerMetrics, CircuitState};
use crate::rate_limit::RateLimitInfo;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Listener for events emitted by breakers, retries, limiters, and bulkheads.
///
/// All methods default to no-ops. Implementations must be fast and
/// non-blocking; they run synchronously on the calling task.
pub trait ResilienceObserver: Send + Sync {
    /// A circuit breaker moved between states.
    fn on_state_change(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        let _ = (breaker, from, to);
    }

    /// Counter snapshot emitted after every breaker call, including rejections.
    fn on_metric(&self, breaker: &str, metrics: &BreakerMetrics) {
        let _ = (breaker, metrics);
    }

    /// A retry is about to sleep and re-attempt. `attempt` is 1-indexed.
    fn on_retry(&self, attempt: usize, delay: Duration, error: &dyn std::error::Error) {
        let _ = (attempt, delay, error);
    }

    /// A rate limiter rejected a key.
    fn on_limit_exceeded(&self, key: &str, info: &RateLimitInfo) {
        let _ = (key, info);
    }

    /// A bulkhead rejected a call outright (capacity and queue both full).
    fn on_reject(&self, resource: &str, metrics: &BulkheadMetrics) {
        let _ = (resource, metrics);
    }
}

/// Observer that discards every event. The default for all primitives.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResilienceObserver for NoopObserver {}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ResilienceObserver for LogObserver {
    fn on_state_change(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        tracing::info!(breaker, ?from, ?to, "circuit breaker state change");
    }

    fn on_metric(&self, breaker: &str, metrics: &BreakerMetrics) {
        tracing::debug!(
            breaker,
            state = ?metrics.state,
            total = metrics.total_calls,
            failed = metrics.failed_calls,
            rejected = metrics.rejected_calls,
            "circuit breaker metrics"
        );
    }

    fn on_retry(&self, attempt: usize, delay: Duration, error: &dyn std::error::Error) {
        tracing::warn!(attempt, ?delay, %error, "retrying after failure");
    }

    fn on_limit_exceeded(&self, key: &str, info: &RateLimitInfo) {
        tracing::warn!(key, limit = info.limit, reset = ?info.reset_after, "rate limit exceeded");
    }

    fn on_reject(&self, resource: &str, metrics: &BulkheadMetrics) {
        tracing::warn!(
            resource,
            in_flight = metrics.in_flight,
            queued = metrics.queued,
            "bulkhead rejected call"
        );
    }
}

/// Event captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    StateChange { breaker: String, from: CircuitState, to: CircuitState },
    Metric { breaker: String, metrics: BreakerMetrics },
    Retry { attempt: usize, delay: Duration, error: String },
    LimitExceeded { key: String, info: RateLimitInfo },
    Reject { resource: String, metrics: BulkheadMetrics },
}

/// Observer that records events in memory, for tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObservedEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().expect("recording observer poisoned").clone()
    }

    /// State transitions only, in emission order.
    pub fn transitions(&self) -> Vec<(CircuitState, CircuitState)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::StateChange { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().expect("recording observer poisoned").push(event);
    }
}

impl ResilienceObserver for RecordingObserver {
    fn on_state_change(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        self.push(ObservedEvent::StateChange { breaker: breaker.to_string(), from, to });
    }

    fn on_metric(&self, breaker: &str, metrics: &BreakerMetrics) {
        self.push(ObservedEvent::Metric { breaker: breaker.to_string(), metrics: metrics.clone() });
    }

    fn on_retry(&self, attempt: usize, delay: Duration, error: &dyn std::error::Error) {
        self.push(ObservedEvent::Retry { attempt, delay, error: error.to_string() });
    }

    fn on_limit_exceeded(&self, key: &str, info: &RateLimitInfo) {
        self.push(ObservedEvent::LimitExceeded { key: key.to_string(), info: info.clone() });
    }

    fn on_reject(&self, resource: &str, metrics: &BulkheadMetrics) {
        self.push(ObservedEvent::Reject {
            resource: resource.to_string(),
            metrics: metrics.clone(),
        });
    }
}

/// Invoke an observer callback, shielding the caller from listener panics.
pub(crate) fn notify(what: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(callback = what, "observer panicked; event dropped");
    }
}
