//! Circuit breaker with lock-free atomics and a per-call timeout.
//!
//! One breaker guards one named downstream dependency. Consecutive failures
//! in the closed state trip it open; while open it fails fast without
//! invoking the operation; after `reset_timeout` a single call transitions
//! it to half-open, and `success_threshold` consecutive successes close it
//! again. Every call runs under `call_timeout`, and a timeout counts as a
//! failure exactly like a business error.

use crate::clock::{Clock, MonotonicClock};
use crate::observer::{notify, NoopObserver, ResilienceObserver};
use crate::ResilienceError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Failing fast; calls are rejected until the reset timeout elapses.
    Open,
    /// Probing; calls pass through while recovery is being judged.
    HalfOpen,
}

impl CircuitState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            other => unreachable!("invalid breaker state value: {}", other),
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerConfigError {
    #[error("failure_threshold must be >= 1")]
    ZeroFailureThreshold,
    #[error("success_threshold must be >= 1")]
    ZeroSuccessThreshold,
    #[error("reset_timeout must be > 0")]
    ZeroResetTimeout,
    #[error("call_timeout must be > 0")]
    ZeroCallTimeout,
}

/// Validated breaker configuration. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    success_threshold: usize,
    reset_timeout: Duration,
    call_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(
        failure_threshold: usize,
        success_threshold: usize,
        reset_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, BreakerConfigError> {
        if failure_threshold == 0 {
            return Err(BreakerConfigError::ZeroFailureThreshold);
        }
        if success_threshold == 0 {
            return Err(BreakerConfigError::ZeroSuccessThreshold);
        }
        if reset_timeout.is_zero() {
            return Err(BreakerConfigError::ZeroResetTimeout);
        }
        if call_timeout.is_zero() {
            return Err(BreakerConfigError::ZeroCallTimeout);
        }
        Ok(Self { failure_threshold, success_threshold, reset_timeout, call_timeout })
    }

    /// Consecutive closed-state failures before opening.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Consecutive half-open successes before closing.
    pub fn success_threshold(&self) -> usize {
        self.success_threshold
    }

    /// Cool-down measured from the moment the circuit opened.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Per-call deadline; an overrun counts as a failure.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

impl Default for CircuitBreakerConfig {
    /// 5 failures to open, 2 successes to close, 30 s cool-down, 10 s calls.
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Counter snapshot returned by [`CircuitBreaker::metrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BreakerMetrics {
    pub state: CircuitState,
    /// Consecutive failures in the current closed/half-open streak.
    pub failure_count: usize,
    /// Consecutive successes in the current half-open streak.
    pub success_count: usize,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerShared {
    state: AtomicU8,
    failure_count: AtomicUsize,
    success_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
}

impl BreakerShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicUsize::new(0),
            success_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }
}

/// Circuit breaker guarding one named dependency.
///
/// Clones share the same underlying state, so every handle observes and
/// drives the same lifecycle.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    shared: Arc<BreakerShared>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker for the named dependency.
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(BreakerShared::new()),
            config,
            clock: Arc::new(MonotonicClock::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Override the clock (deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Attach an observer for state changes and metric snapshots.
    pub fn with_observer<O: ResilienceObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Dependency name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Snapshot of counters and state. No side effects.
    pub fn metrics(&self) -> BreakerMetrics {
        BreakerMetrics {
            state: self.state(),
            failure_count: self.shared.failure_count.load(Ordering::Acquire),
            success_count: self.shared.success_count.load(Ordering::Acquire),
            total_calls: self.shared.total_calls.load(Ordering::Acquire),
            successful_calls: self.shared.successful_calls.load(Ordering::Acquire),
            failed_calls: self.shared.failed_calls.load(Ordering::Acquire),
            rejected_calls: self.shared.rejected_calls.load(Ordering::Acquire),
        }
    }

    /// Force the breaker closed and zero every counter. Administrative
    /// recovery and test isolation only; normal operation never calls this.
    pub fn reset(&self) {
        let previous = CircuitState::from_u8(
            self.shared.state.swap(STATE_CLOSED, Ordering::AcqRel),
        );
        self.shared.failure_count.store(0, Ordering::Release);
        self.shared.success_count.store(0, Ordering::Release);
        self.shared.opened_at_millis.store(0, Ordering::Release);
        self.shared.total_calls.store(0, Ordering::Release);
        self.shared.successful_calls.store(0, Ordering::Release);
        self.shared.failed_calls.store(0, Ordering::Release);
        self.shared.rejected_calls.store(0, Ordering::Release);
        if previous != CircuitState::Closed {
            self.state_changed(previous, CircuitState::Closed);
        }
    }

    /// Run `operation` under breaker protection.
    ///
    /// While the circuit is open the operation is never invoked: the call
    /// rejects immediately with `ResilienceError::CircuitOpen`. Otherwise the
    /// operation runs under `call_timeout`; an overrun surfaces as
    /// `ResilienceError::Timeout` and counts as a failure.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        self.shared.total_calls.fetch_add(1, Ordering::AcqRel);

        loop {
            match self.state() {
                CircuitState::Open => {
                    let opened_at = self.shared.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                    let reset_millis = self.config.reset_timeout.as_millis() as u64;

                    if elapsed >= reset_millis {
                        match self.shared.state.compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => {
                                self.shared.success_count.store(0, Ordering::Release);
                                tracing::info!(breaker = %self.name, "circuit half-open: test call");
                                self.state_changed(CircuitState::Open, CircuitState::HalfOpen);
                                break;
                            }
                            // Lost the race; another caller moved the state.
                            Err(_) => continue,
                        }
                    } else {
                        self.shared.rejected_calls.fetch_add(1, Ordering::AcqRel);
                        let err = ResilienceError::CircuitOpen {
                            state: CircuitState::Open,
                            failure_count: self.shared.failure_count.load(Ordering::Acquire),
                            retry_after: Duration::from_millis(reset_millis - elapsed),
                        };
                        self.emit_metrics();
                        return Err(err);
                    }
                }
                CircuitState::HalfOpen | CircuitState::Closed => break,
            }
        }

        let started = Instant::now();
        // The timeout future is dropped on every exit path, so the timer is
        // always cancelled; on expiry the operation future is dropped too,
        // cancelling it at its next suspension point.
        let result = match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(ResilienceError::Timeout {
                elapsed: started.elapsed(),
                timeout: self.config.call_timeout,
            }),
        };

        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        self.emit_metrics();
        result
    }

    fn on_success(&self) {
        self.shared.successful_calls.fetch_add(1, Ordering::AcqRel);
        match self.state() {
            CircuitState::Closed => {
                self.shared.failure_count.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.shared.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold
                    && self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_HALF_OPEN,
                            STATE_CLOSED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.shared.failure_count.store(0, Ordering::Release);
                    self.shared.success_count.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!(breaker = %self.name, "circuit closed");
                    self.state_changed(CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        self.shared.failed_calls.fetch_add(1, Ordering::AcqRel);
        match self.state() {
            CircuitState::HalfOpen => {
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.success_count.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    tracing::warn!(breaker = %self.name, "circuit test call failed: reopening");
                    self.state_changed(CircuitState::HalfOpen, CircuitState::Open);
                }
            }
            CircuitState::Closed => {
                let failures = self.shared.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.shared.success_count.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    tracing::error!(
                        breaker = %self.name,
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit opened"
                    );
                    self.state_changed(CircuitState::Closed, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn state_changed(&self, from: CircuitState, to: CircuitState) {
        notify("on_state_change", || self.observer.on_state_change(&self.name, from, to));
    }

    fn emit_metrics(&self) {
        let snapshot = self.metrics();
        notify("on_metric", || self.observer.on_metric(&self.name, &snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::observer::RecordingObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn config(failures: usize, successes: usize, reset_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            failures,
            successes,
            Duration::from_millis(reset_ms),
            Duration::from_secs(5),
        )
        .expect("valid config")
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<i32, ResilienceError<TestError>> {
        breaker
            .execute(|| async { Err::<i32, _>(ResilienceError::Inner(TestError("fail".into()))) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<i32, ResilienceError<TestError>> {
        breaker.execute(|| async { Ok::<_, ResilienceError<TestError>>(1) }).await
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            CircuitBreakerConfig::new(0, 1, Duration::from_secs(1), Duration::from_secs(1)),
            Err(BreakerConfigError::ZeroFailureThreshold)
        ));
        assert!(matches!(
            CircuitBreakerConfig::new(1, 0, Duration::from_secs(1), Duration::from_secs(1)),
            Err(BreakerConfigError::ZeroSuccessThreshold)
        ));
        assert!(matches!(
            CircuitBreakerConfig::new(1, 1, Duration::ZERO, Duration::from_secs(1)),
            Err(BreakerConfigError::ZeroResetTimeout)
        ));
        assert!(matches!(
            CircuitBreakerConfig::new(1, 1, Duration::from_secs(1), Duration::ZERO),
            Err(BreakerConfigError::ZeroCallTimeout)
        ));
    }

    #[tokio::test]
    async fn starts_closed_and_passes_calls_through() {
        let breaker = CircuitBreaker::new("db", CircuitBreakerConfig::default());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(succeed(&breaker).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("db", config(3, 1, 10_000));

        for _ in 0..2 {
            let _ = fail(&breaker).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking_operation() {
        let breaker = CircuitBreaker::new("db", config(1, 1, 10_000));
        let _ = fail(&breaker).await;

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();
        let result = breaker
            .execute(|| {
                let invoked = invoked_clone.clone();
                async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ResilienceError<TestError>>(1)
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_circuit_open());
        assert!(err.retry_after().unwrap() <= Duration::from_millis(10_000));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_in_closed_state_resets_failure_streak() {
        let breaker = CircuitBreaker::new("db", config(3, 1, 10_000));

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = succeed(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        // F-F-S-F-F never reaches three consecutive failures.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn transitions_to_half_open_after_reset_timeout() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new("db", config(1, 2, 1000)).with_clock(clock.clone());

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(999);
        assert!(fail(&breaker).await.unwrap_err().is_circuit_open());

        clock.advance(1);
        assert_eq!(succeed(&breaker).await.unwrap(), 1);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn rejected_bursts_do_not_extend_the_open_period() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new("db", config(1, 1, 1000)).with_clock(clock.clone());

        let _ = fail(&breaker).await;
        // Hammer the open breaker; recovery is measured from the open
        // transition, not from the last rejection.
        for _ in 0..10 {
            clock.advance(50);
            assert!(succeed(&breaker).await.unwrap_err().is_circuit_open());
        }
        clock.advance(500); // 1000ms total since opening
        assert_eq!(succeed(&breaker).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn closes_after_success_threshold_consecutive_successes() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new("db", config(1, 2, 100)).with_clock(clock.clone());

        let _ = fail(&breaker).await;
        clock.advance(100);

        let _ = succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new("db", config(1, 2, 100)).with_clock(clock.clone());

        let _ = fail(&breaker).await;
        clock.advance(100);
        let _ = succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        // Success streak starts over on the next probe.
        assert_eq!(breaker.metrics().success_count, 0);
    }

    #[tokio::test]
    async fn call_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(
            "slow",
            CircuitBreakerConfig::new(
                1,
                1,
                Duration::from_secs(10),
                Duration::from_millis(20),
            )
            .unwrap(),
        );

        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ResilienceError<TestError>>(1)
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().failed_calls, 1);
    }

    #[tokio::test]
    async fn counters_track_every_outcome() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new("db", config(2, 1, 1000)).with_clock(clock.clone());

        let _ = succeed(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await; // opens
        let _ = succeed(&breaker).await; // rejected

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 4);
        assert_eq!(metrics.successful_calls, 1);
        assert_eq!(metrics.failed_calls, 2);
        assert_eq!(metrics.rejected_calls, 1);
    }

    #[tokio::test]
    async fn reset_forces_closed_and_zeroes_counters() {
        let breaker = CircuitBreaker::new("db", config(1, 1, 10_000));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 0);
        assert_eq!(metrics.failed_calls, 0);
        assert_eq!(metrics.failure_count, 0);

        assert_eq!(succeed(&breaker).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn observer_sees_full_transition_cycle() {
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let breaker = CircuitBreaker::new("db", config(1, 1, 100))
            .with_clock(clock.clone())
            .with_observer(observer.clone());

        let _ = fail(&breaker).await;
        clock.advance(100);
        let _ = succeed(&breaker).await;

        assert_eq!(
            observer.transitions(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn metric_snapshots_emitted_for_rejections_too() {
        let observer = RecordingObserver::new();
        let breaker =
            CircuitBreaker::new("db", config(1, 1, 10_000)).with_observer(observer.clone());

        let _ = fail(&breaker).await;
        let _ = succeed(&breaker).await; // rejected

        let metric_count = observer
            .events()
            .iter()
            .filter(|e| matches!(e, crate::observer::ObservedEvent::Metric { .. }))
            .count();
        assert_eq!(metric_count, 2, "one snapshot per call, including the rejection");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn metrics_serialize_for_export() {
        let breaker = CircuitBreaker::new("db", CircuitBreakerConfig::default());
        let json = serde_json::to_value(breaker.metrics()).unwrap();
        assert_eq!(json["state"], "Closed");
        assert_eq!(json["total_calls"], 0);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let breaker = CircuitBreaker::new("db", config(1, 1, 10_000));
        let other = breaker.clone();

        let _ = fail(&breaker).await;
        assert_eq!(other.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn concurrent_half_open_race_moves_state_once() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new("db", config(1, 100, 100)).with_clock(clock.clone());
        let _ = fail(&breaker).await;
        clock.advance(100);

        let mut handles = vec![];
        for _ in 0..50 {
            let b = breaker.clone();
            handles.push(tokio::spawn(async move { succeed(&b).await }));
        }
        let results = futures::future::join_all(handles).await;
        assert!(results.iter().all(|r| r.as_ref().unwrap().is_ok()));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }
}
