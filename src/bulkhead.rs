//! Bulkhead: bounded concurrency with a bounded FIFO wait queue.
//!
//! A bulkhead caps how many operations run against a resource at once. When
//! every execution slot is busy a caller may wait in a bounded queue for up
//! to `queue_timeout`; once the queue is full too, callers are rejected
//! immediately so load sheds instead of piling up.

use crate::observer::{notify, NoopObserver, ResilienceObserver};
use crate::ResilienceError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkheadConfigError {
    #[error("max_concurrent must be >= 1")]
    ZeroMaxConcurrent,
    #[error("queue_timeout must be > 0")]
    ZeroQueueTimeout,
}

/// Validated bulkhead configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    max_concurrent: usize,
    max_queue: usize,
    queue_timeout: Duration,
}

impl BulkheadConfig {
    /// `max_queue` of zero disables queueing: a saturated bulkhead rejects
    /// immediately.
    pub fn new(
        max_concurrent: usize,
        max_queue: usize,
        queue_timeout: Duration,
    ) -> Result<Self, BulkheadConfigError> {
        if max_concurrent == 0 {
            return Err(BulkheadConfigError::ZeroMaxConcurrent);
        }
        if queue_timeout.is_zero() {
            return Err(BulkheadConfigError::ZeroQueueTimeout);
        }
        Ok(Self { max_concurrent, max_queue, queue_timeout })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn max_queue(&self) -> usize {
        self.max_queue
    }

    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }
}

impl Default for BulkheadConfig {
    /// 10 concurrent, 10 queued, 5 s queue timeout.
    fn default() -> Self {
        Self { max_concurrent: 10, max_queue: 10, queue_timeout: Duration::from_secs(5) }
    }
}

/// Snapshot returned by [`Bulkhead::metrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BulkheadMetrics {
    /// Operations currently holding an execution slot.
    pub in_flight: usize,
    /// Callers currently waiting for a slot.
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue: usize,
    /// Operations that ran to completion, successfully or not.
    pub total_executions: u64,
    pub total_rejections: u64,
    pub total_timeouts: u64,
    /// Mean wall-clock time of completed executions.
    pub avg_execution_time: Duration,
}

#[derive(Debug)]
struct BulkheadState {
    semaphore: Semaphore,
    queued: AtomicUsize,
    total_executions: AtomicU64,
    total_rejections: AtomicU64,
    total_timeouts: AtomicU64,
    execution_nanos: AtomicU64,
}

/// Decrements the queued count even if the waiting caller is cancelled.
struct QueueSlot<'a> {
    state: &'a BulkheadState,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.state.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Concurrency limiter for one named resource.
///
/// Clones share the same slots, queue, and counters. Queued callers acquire
/// slots in arrival order.
#[derive(Clone)]
pub struct Bulkhead {
    name: Arc<str>,
    config: BulkheadConfig,
    state: Arc<BulkheadState>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl Bulkhead {
    pub fn new(name: impl Into<Arc<str>>, config: BulkheadConfig) -> Self {
        let state = BulkheadState {
            semaphore: Semaphore::new(config.max_concurrent),
            queued: AtomicUsize::new(0),
            total_executions: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
            execution_nanos: AtomicU64::new(0),
        };
        Self {
            name: name.into(),
            config,
            state: Arc::new(state),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Attach an observer notified on every rejection.
    pub fn with_observer<O: ResilienceObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    pub fn metrics(&self) -> BulkheadMetrics {
        let executions = self.state.total_executions.load(Ordering::Acquire);
        let nanos = self.state.execution_nanos.load(Ordering::Acquire);
        BulkheadMetrics {
            in_flight: self.config.max_concurrent - self.state.semaphore.available_permits(),
            queued: self.state.queued.load(Ordering::Acquire),
            max_concurrent: self.config.max_concurrent,
            max_queue: self.config.max_queue,
            total_executions: executions,
            total_rejections: self.state.total_rejections.load(Ordering::Acquire),
            total_timeouts: self.state.total_timeouts.load(Ordering::Acquire),
            avg_execution_time: if executions == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(nanos / executions)
            },
        }
    }

    /// Run `operation` inside the bulkhead.
    ///
    /// Fast path: a free slot means the operation starts immediately. Slow
    /// path: the caller waits in the queue for up to `queue_timeout`
    /// (`ResilienceError::BulkheadTimeout` on expiry). With slots and queue
    /// both full the call rejects at once with
    /// `ResilienceError::BulkheadFull`. Operation errors propagate
    /// unchanged and still count as completed executions.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let permit = match self.state.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                let reserved = self
                    .state
                    .queued
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                        (queued < self.config.max_queue).then_some(queued + 1)
                    })
                    .is_ok();
                if !reserved {
                    self.state.total_rejections.fetch_add(1, Ordering::AcqRel);
                    let metrics = self.metrics();
                    tracing::warn!(
                        resource = %self.name,
                        in_flight = metrics.in_flight,
                        queued = metrics.queued,
                        "bulkhead saturated: rejecting"
                    );
                    notify("on_reject", || self.observer.on_reject(&self.name, &metrics));
                    return Err(ResilienceError::BulkheadFull {
                        in_flight: metrics.in_flight,
                        max_concurrent: self.config.max_concurrent,
                        queued: metrics.queued,
                        max_queue: self.config.max_queue,
                    });
                }

                let slot = QueueSlot { state: &self.state };
                let started = tokio::time::Instant::now();
                let acquired =
                    tokio::time::timeout(self.config.queue_timeout, self.state.semaphore.acquire())
                        .await;
                drop(slot);
                match acquired {
                    Ok(Ok(permit)) => permit,
                    // The semaphore is never closed.
                    Ok(Err(_)) => unreachable!("bulkhead semaphore closed"),
                    Err(_) => {
                        self.state.total_timeouts.fetch_add(1, Ordering::AcqRel);
                        tracing::warn!(
                            resource = %self.name,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "bulkhead queue wait timed out"
                        );
                        return Err(ResilienceError::BulkheadTimeout {
                            waited: started.elapsed(),
                            timeout: self.config.queue_timeout,
                        });
                    }
                }
            }
        };

        let started = tokio::time::Instant::now();
        let result = operation().await;
        drop(permit);

        self.state.total_executions.fetch_add(1, Ordering::AcqRel);
        self.state
            .execution_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::AcqRel);
        result
    }
}
