//! Retry policy for fallible async operations.
//!
//! Semantics:
//! - `max_retries` counts *re*-tries: `execute` invokes the operation at most
//!   `max_retries + 1` times.
//! - Only `ResilienceError::Inner(E)` failures are eligible for retry. The
//!   rejection variants produced by other primitives (open circuit, bulkhead,
//!   timeout) return immediately, so composing retry around a breaker never
//!   silently hammers an open circuit.
//! - The `should_retry` predicate classifies an `Inner` error as transient or
//!   fatal; a fatal error returns unchanged without consuming attempts.
//! - Backoff computes each delay, jitter randomizes it, and the injected
//!   [`Sleeper`] applies it (tests swap in [`NoopSleeper`] or
//!   [`RecordingSleeper`]).
//! - When every attempt fails the final error is wrapped in
//!   `RetryExhausted`, preserving the last failure and total attempt count.
//!
//! ```rust
//! use meshguard::{Backoff, Jitter, ResilienceError, RetryPolicy};
//! use std::time::Duration;
//!
//! # #[derive(Debug)]
//! # struct MyErr;
//! # impl std::fmt::Display for MyErr {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "oops") }
//! # }
//! # impl std::error::Error for MyErr {}
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<MyErr>::builder()
//!     .max_retries(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(100), 2.0).unwrap())
//!     .jitter(Jitter::full())
//!     .build();
//! let result: Result<(), _> =
//!     policy.execute(|| async { Err(ResilienceError::Inner(MyErr)) }).await;
//! assert!(result.unwrap_err().is_retry_exhausted());
//! # });
//! ```

use crate::observer::{notify, NoopObserver, ResilienceObserver};
use crate::{Backoff, Jitter, ResilienceError, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[cfg(doc)]
use crate::sleeper::{NoopSleeper, RecordingSleeper};

/// Retry policy combining attempt budget, backoff, jitter, and classification.
pub struct RetryPolicy<E> {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn ResilienceObserver>,
}

// Manual impl: the derive would demand `E: Clone`, but the error type only
// appears behind the predicate.
impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            backoff: self.backoff.clone(),
            jitter: self.jitter,
            should_retry: self.should_retry.clone(),
            sleeper: self.sleeper.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Builder with production defaults: 3 retries, exponential backoff
    /// (100 ms base, x2, 30 s cap), full jitter, retry-everything predicate.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Number of retries after the initial attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Execute an operation, retrying transient failures with backoff.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(ResilienceError::Inner(e)) => {
                    if !(self.should_retry)(&e) {
                        return Err(ResilienceError::Inner(e));
                    }
                    if attempt == self.max_retries {
                        return Err(ResilienceError::retry_exhausted(self.max_retries + 1, e));
                    }

                    let delay = self.jitter.apply(self.backoff.delay(attempt + 1));
                    notify("on_retry", || self.observer.on_retry(attempt + 1, delay, &e));
                    tracing::debug!(attempt = attempt + 1, ?delay, error = %e, "retrying");
                    self.sleeper.sleep(delay).await;
                }
                // Rejections from other primitives are not retried.
                Err(e) => return Err(e),
            }
        }
        unreachable!("the final attempt either returned Ok or RetryExhausted")
    }
}

/// Execute `operation` under `policy`. Free-function form of
/// [`RetryPolicy::execute`] for call sites that read better without a method.
pub async fn with_retry<T, E, Fut, Op>(
    policy: &RetryPolicy<E>,
    operation: Op,
) -> Result<T, ResilienceError<E>>
where
    T: Send,
    E: std::error::Error + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
    Op: FnMut() -> Fut + Send,
{
    policy.execute(operation).await
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder<E> {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn ResilienceObserver>,
}

impl<E> std::fmt::Debug for RetryPolicyBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicyBuilder")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let backoff = Backoff::exponential(Duration::from_millis(100), 2.0)
            .and_then(|b| b.with_max(Duration::from_secs(30)))
            .expect("default backoff parameters are valid");
        Self {
            max_retries: 3,
            backoff,
            jitter: Jitter::Full,
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Retries after the initial attempt. Zero disables retrying.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Predicate deciding whether an `Inner` error is worth retrying.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn observer<O: ResilienceObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
            observer: self.observer,
        }
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// True for I/O error kinds that typically clear on their own: connection
/// churn, timeouts, truncated reads.
pub fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::UnexpectedEof
    )
}

/// True for HTTP statuses worth retrying: server errors, throttling (429),
/// and request timeout (408).
pub fn is_transient_status(status: u16) -> bool {
    (500..=599).contains(&status) || status == 429 || status == 408
}

/// Walks an error's source chain and reports whether any link is a transient
/// I/O error. Useful as a [`RetryPolicyBuilder::should_retry`] predicate for
/// errors that wrap `std::io::Error`.
pub fn is_transient_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            return is_transient_io(io_err);
        }
        current = e.source();
    }
    false
}
