//! The three limiter strategies.
//!
//! Each keeps per-key state in a `Mutex<HashMap>`; decisions are a few
//! arithmetic operations under the lock, so contention stays low. A
//! `last_seen` stamp on every entry drives [`super::RateLimiter::evict_idle`].

use super::{RateLimitInfo, RateLimiter, RateLimiterConfig, RateLimiterMetrics};
use crate::clock::{Clock, MonotonicClock};
use crate::observer::{notify, NoopObserver, ResilienceObserver};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cumulative admit/reject totals shared by all three strategies. Never
/// cleared by per-key resets.
#[derive(Debug, Default)]
struct AdmissionCounters {
    allowed: AtomicU64,
    rejected: AtomicU64,
}

impl AdmissionCounters {
    fn record(&self, allowed: bool) {
        if allowed {
            self.allowed.fetch_add(1, Ordering::AcqRel);
        } else {
            self.rejected.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn snapshot(&self, tracked_keys: usize) -> RateLimiterMetrics {
        RateLimiterMetrics {
            tracked_keys,
            total_allowed: self.allowed.load(Ordering::Acquire),
            total_rejected: self.rejected.load(Ordering::Acquire),
        }
    }
}

fn rejected(
    observer: &Arc<dyn ResilienceObserver>,
    strategy: &str,
    key: &str,
    info: &RateLimitInfo,
) {
    tracing::debug!(
        strategy,
        key,
        limit = info.limit,
        reset_after_ms = info.reset_after.as_millis() as u64,
        "rate limit exceeded"
    );
    notify("on_limit_exceeded", || observer.on_limit_exceeded(key, info));
}

// ---------------------------------------------------------------------------
// Token bucket
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: u64,
    last_seen: u64,
}

/// Continuous-refill token bucket.
///
/// Each key owns a bucket of `max_requests` tokens refilled at
/// `max_requests / window` tokens per unit time. A fresh key starts full, so
/// bursts up to the capacity are admitted immediately.
pub struct TokenBucket {
    config: RateLimiterConfig,
    buckets: Mutex<HashMap<String, BucketState>>,
    totals: AdmissionCounters,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket").field("config", &self.config).finish()
    }
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            totals: AdmissionCounters::default(),
            clock: Arc::new(MonotonicClock::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer<O: ResilienceObserver + 'static>(self, observer: O) -> Self {
        self.with_shared_observer(Arc::new(observer))
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn ResilienceObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Tokens refilled per millisecond.
    fn rate(&self) -> f64 {
        f64::from(self.config.max_requests()) / self.config.window_millis() as f64
    }
}

impl RateLimiter for TokenBucket {
    fn consume_n(&self, key: &str, permits: u32) -> RateLimitInfo {
        let now = self.clock.now_millis();
        let max = f64::from(self.config.max_requests());
        let rate = self.rate();

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let state = buckets.entry(key.to_string()).or_insert_with(|| BucketState {
            tokens: max,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.saturating_sub(state.last_refill);
        state.tokens = (state.tokens + elapsed as f64 * rate).min(max);
        state.last_refill = now;
        state.last_seen = now;

        let wanted = f64::from(permits);
        let allowed = state.tokens >= wanted;
        if allowed {
            state.tokens -= wanted;
        }
        // Allowed: time until the bucket is full again. Rejected: time until
        // the requested permits become available.
        let deficit = if allowed { max - state.tokens } else { wanted - state.tokens };
        let info = RateLimitInfo {
            limit: self.config.max_requests(),
            remaining: state.tokens.floor() as u32,
            reset_after: Duration::from_millis((deficit / rate).ceil() as u64),
            allowed,
        };
        drop(buckets);

        self.totals.record(allowed);
        if !allowed {
            rejected(&self.observer, "token_bucket", key, &info);
        }
        info
    }

    fn reset(&self, key: &str) {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    fn reset_all(&self) {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = self.clock.now_millis();
        let idle_ms = idle_for.as_millis() as u64;
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, state| now.saturating_sub(state.last_seen) < idle_ms);
        before - buckets.len()
    }

    fn tracked_keys(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn metrics(&self) -> RateLimiterMetrics {
        self.totals.snapshot(self.tracked_keys())
    }

    fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Sliding window
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WindowLog {
    timestamps: VecDeque<u64>,
    last_seen: u64,
}

/// Exact rolling-window counter.
///
/// Keeps the timestamp of every admitted request inside the window, so the
/// count is exact at the cost of O(limit) memory per key.
pub struct SlidingWindow {
    config: RateLimiterConfig,
    logs: Mutex<HashMap<String, WindowLog>>,
    totals: AdmissionCounters,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for SlidingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow").field("config", &self.config).finish()
    }
}

impl SlidingWindow {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            logs: Mutex::new(HashMap::new()),
            totals: AdmissionCounters::default(),
            clock: Arc::new(MonotonicClock::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer<O: ResilienceObserver + 'static>(self, observer: O) -> Self {
        self.with_shared_observer(Arc::new(observer))
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn ResilienceObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl RateLimiter for SlidingWindow {
    fn consume_n(&self, key: &str, permits: u32) -> RateLimitInfo {
        let now = self.clock.now_millis();
        let window_ms = self.config.window_millis();
        let max = self.config.max_requests();

        let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        let log = logs.entry(key.to_string()).or_insert_with(|| WindowLog {
            timestamps: VecDeque::new(),
            last_seen: now,
        });
        log.last_seen = now;

        while log.timestamps.front().is_some_and(|&ts| now.saturating_sub(ts) >= window_ms) {
            log.timestamps.pop_front();
        }

        let in_window = log.timestamps.len() as u32;
        let allowed = in_window.saturating_add(permits) <= max;
        if allowed {
            for _ in 0..permits {
                log.timestamps.push_back(now);
            }
        }
        let used = log.timestamps.len() as u32;
        let reset_after = match log.timestamps.front() {
            Some(&oldest) => Duration::from_millis((oldest + window_ms).saturating_sub(now)),
            None => Duration::ZERO,
        };
        let info = RateLimitInfo {
            limit: max,
            remaining: max.saturating_sub(used),
            reset_after,
            allowed,
        };
        drop(logs);

        self.totals.record(allowed);
        if !allowed {
            rejected(&self.observer, "sliding_window", key, &info);
        }
        info
    }

    fn reset(&self, key: &str) {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    fn reset_all(&self) {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = self.clock.now_millis();
        let idle_ms = idle_for.as_millis() as u64;
        let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        let before = logs.len();
        logs.retain(|_, log| now.saturating_sub(log.last_seen) < idle_ms);
        before - logs.len()
    }

    fn tracked_keys(&self) -> usize {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn metrics(&self) -> RateLimiterMetrics {
        self.totals.snapshot(self.tracked_keys())
    }

    fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Fixed window
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WindowCounter {
    count: u32,
    window_start: u64,
    last_seen: u64,
}

/// Counter per window, with windows aligned to multiples of the window
/// length.
///
/// O(1) memory per key. Up to `2 * max_requests` calls can be admitted
/// within any rolling window that straddles a boundary; callers who need a
/// hard bound use [`SlidingWindow`].
pub struct FixedWindow {
    config: RateLimiterConfig,
    counters: Mutex<HashMap<String, WindowCounter>>,
    totals: AdmissionCounters,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for FixedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindow").field("config", &self.config).finish()
    }
}

impl FixedWindow {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
            totals: AdmissionCounters::default(),
            clock: Arc::new(MonotonicClock::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer<O: ResilienceObserver + 'static>(self, observer: O) -> Self {
        self.with_shared_observer(Arc::new(observer))
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn ResilienceObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl RateLimiter for FixedWindow {
    fn consume_n(&self, key: &str, permits: u32) -> RateLimitInfo {
        let now = self.clock.now_millis();
        let window_ms = self.config.window_millis();
        let max = self.config.max_requests();

        let window_start = now - now % window_ms;
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(key.to_string()).or_insert_with(|| WindowCounter {
            count: 0,
            window_start,
            last_seen: now,
        });
        counter.last_seen = now;

        if counter.window_start != window_start {
            counter.count = 0;
            counter.window_start = window_start;
        }

        let allowed = counter.count.saturating_add(permits) <= max;
        if allowed {
            counter.count += permits;
        }
        let info = RateLimitInfo {
            limit: max,
            remaining: max.saturating_sub(counter.count),
            reset_after: Duration::from_millis(
                (counter.window_start + window_ms).saturating_sub(now),
            ),
            allowed,
        };
        drop(counters);

        self.totals.record(allowed);
        if !allowed {
            rejected(&self.observer, "fixed_window", key, &info);
        }
        info
    }

    fn reset(&self, key: &str) {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    fn reset_all(&self) {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = self.clock.now_millis();
        let idle_ms = idle_for.as_millis() as u64;
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let before = counters.len();
        counters.retain(|_, counter| now.saturating_sub(counter.last_seen) < idle_ms);
        before - counters.len()
    }

    fn tracked_keys(&self) -> usize {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn metrics(&self) -> RateLimiterMetrics {
        self.totals.snapshot(self.tracked_keys())
    }

    fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
