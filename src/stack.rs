//! Composed resilience pipeline.
//!
//! `ResilienceStack` nests the primitives in the order callers compose them
//! by hand: bulkhead outermost (shed load before anything else spends
//! effort), circuit breaker next (fail fast on a known-bad dependency), and
//! retry innermost (transient errors are retried without repeatedly charging
//! the breaker). Every layer is optional; an empty stack just runs the
//! operation.

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::CircuitBreaker;
use crate::retry::RetryPolicy;
use crate::ResilienceError;
use std::future::Future;

/// Bulkhead, circuit breaker, and retry wrapped around one operation.
pub struct ResilienceStack<E> {
    bulkhead: Option<Bulkhead>,
    breaker: Option<CircuitBreaker>,
    retry: Option<RetryPolicy<E>>,
}

// Manual impls: the derives would demand `E: Clone`/`E: Debug`, but the
// error type only ever appears behind the retry predicate.
impl<E> Clone for ResilienceStack<E> {
    fn clone(&self) -> Self {
        Self {
            bulkhead: self.bulkhead.clone(),
            breaker: self.breaker.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<E> std::fmt::Debug for ResilienceStack<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceStack")
            .field("bulkhead", &self.bulkhead)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .finish()
    }
}

impl<E> ResilienceStack<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn builder() -> StackBuilder<E> {
        StackBuilder::new()
    }

    pub fn bulkhead(&self) -> Option<&Bulkhead> {
        self.bulkhead.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn retry(&self) -> Option<&RetryPolicy<E>> {
        self.retry.as_ref()
    }

    /// Run `operation` through every configured layer.
    ///
    /// The operation must be re-invokable (`Fn`): the retry layer may call
    /// it several times within a single pass through the outer layers.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: Fn() -> Fut + Send + Sync,
    {
        let retried = || async {
            match &self.retry {
                Some(policy) => policy.execute(&operation).await,
                None => operation().await,
            }
        };
        let guarded = || async {
            match &self.breaker {
                Some(breaker) => breaker.execute(retried).await,
                None => retried().await,
            }
        };
        match &self.bulkhead {
            Some(bulkhead) => bulkhead.execute(guarded).await,
            None => guarded().await,
        }
    }
}

/// Builder for [`ResilienceStack`]. Layers left unset are skipped.
pub struct StackBuilder<E> {
    bulkhead: Option<Bulkhead>,
    breaker: Option<CircuitBreaker>,
    retry: Option<RetryPolicy<E>>,
}

impl<E> std::fmt::Debug for StackBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackBuilder")
            .field("bulkhead", &self.bulkhead)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .finish()
    }
}

impl<E> StackBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { bulkhead: None, breaker: None, retry: None }
    }

    pub fn with_bulkhead(mut self, bulkhead: Bulkhead) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy<E>) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> ResilienceStack<E> {
        ResilienceStack {
            bulkhead: self.bulkhead,
            breaker: self.breaker,
            retry: self.retry,
        }
    }
}

impl<E> Default for StackBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulkhead::BulkheadConfig;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::sleeper::NoopSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError")
        }
    }

    impl std::error::Error for TestError {}

    fn breaker(failures: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            "dep",
            CircuitBreakerConfig::new(
                failures,
                1,
                Duration::from_secs(10),
                Duration::from_secs(5),
            )
            .unwrap(),
        )
    }

    fn instant_retry(max_retries: usize) -> RetryPolicy<TestError> {
        RetryPolicy::builder().max_retries(max_retries).sleeper(NoopSleeper).build()
    }

    #[tokio::test]
    async fn empty_stack_runs_the_operation_directly() {
        let stack: ResilienceStack<TestError> = ResilienceStack::builder().build();
        let result = stack.execute(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn full_stack_passes_a_healthy_call_through() {
        let stack = ResilienceStack::builder()
            .with_bulkhead(Bulkhead::new("dep", BulkheadConfig::default()))
            .with_circuit_breaker(breaker(3))
            .with_retry(instant_retry(2))
            .build();

        let result = stack.execute(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(stack.circuit_breaker().unwrap().metrics().successful_calls, 1);
        assert_eq!(stack.bulkhead().unwrap().metrics().total_executions, 1);
    }

    #[tokio::test]
    async fn retries_happen_inside_a_single_breaker_call() {
        let stack = ResilienceStack::builder()
            .with_circuit_breaker(breaker(2))
            .with_retry(instant_retry(3))
            .build();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result = stack
            .execute(move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ResilienceError::Inner(TestError))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two transient failures were absorbed by retry; the breaker saw one
        // successful call.
        let metrics = stack.circuit_breaker().unwrap().metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.failure_count, 0);
        assert_eq!(metrics.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn exhausted_retries_count_as_one_breaker_failure() {
        let stack = ResilienceStack::builder()
            .with_circuit_breaker(breaker(2))
            .with_retry(instant_retry(2))
            .build();

        let result: Result<(), _> = stack
            .execute(|| async { Err(ResilienceError::Inner(TestError)) })
            .await;
        assert!(result.unwrap_err().is_retry_exhausted());
        assert_eq!(stack.circuit_breaker().unwrap().metrics().failure_count, 1);
    }

    #[tokio::test]
    async fn open_breaker_rejects_before_the_operation_runs() {
        let stack = ResilienceStack::builder()
            .with_circuit_breaker(breaker(1))
            .with_retry(instant_retry(0))
            .build();

        let _: Result<(), _> = stack
            .execute(|| async { Err(ResilienceError::Inner(TestError)) })
            .await;
        assert_eq!(stack.circuit_breaker().unwrap().state(), CircuitState::Open);

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();
        let result = stack
            .execute(move || {
                let invoked = invoked_clone.clone();
                async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ResilienceError<TestError>>(7)
                }
            })
            .await;

        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_bulkhead_rejects_ahead_of_the_inner_layers() {
        let stack: Arc<ResilienceStack<TestError>> = Arc::new(
            ResilienceStack::builder()
                .with_bulkhead(Bulkhead::new(
                    "dep",
                    BulkheadConfig::new(1, 0, Duration::from_secs(1)).unwrap(),
                ))
                .with_circuit_breaker(breaker(5))
                .build(),
        );

        let holder = {
            let stack = stack.clone();
            tokio::spawn(async move {
                stack
                    .execute(|| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, ResilienceError<TestError>>(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = stack.execute(|| async { Ok(()) }).await;
        assert!(result.unwrap_err().is_bulkhead());
        // The rejection never reached the breaker.
        assert_eq!(stack.circuit_breaker().unwrap().metrics().total_calls, 1);
        assert!(holder.await.unwrap().is_ok());
    }
}
