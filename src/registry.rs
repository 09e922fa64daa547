//! Registry of named circuit breakers.
//!
//! A registry owns one breaker per dependency name and hands out shared
//! handles, so every caller hitting "postgres" trips and recovers the same
//! circuit. Registries are plain values; share one via `Clone` (handles
//! point at the same map) instead of a process-wide global.

use crate::circuit_breaker::{BreakerMetrics, CircuitBreaker, CircuitBreakerConfig};
use crate::clock::{Clock, MonotonicClock};
use crate::observer::{NoopObserver, ResilienceObserver};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no circuit breaker named '{0}'")]
    NotFound(String),
}

/// Named collection of circuit breakers sharing a default configuration,
/// clock, and observer.
#[derive(Clone)]
pub struct BreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    default_config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ResilienceObserver>,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .field("default_config", &self.default_config)
            .finish()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl BreakerRegistry {
    /// Registry whose breakers are created with `default_config` unless a
    /// call-site supplies its own.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            default_config,
            clock: Arc::new(MonotonicClock::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Clock inherited by every breaker created through this registry.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Observer inherited by every breaker created through this registry.
    pub fn with_observer<O: ResilienceObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Fetch the breaker for `name`, creating it with the registry default
    /// configuration on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.default_config.clone())
    }

    /// Fetch the breaker for `name`, creating it with `config` on first use.
    ///
    /// If the breaker already exists the supplied configuration is ignored;
    /// the first creation wins, including under concurrent callers.
    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        // Re-check under the write lock: another caller may have created it
        // between our read and this write.
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = name, "registering circuit breaker");
                Arc::new(
                    CircuitBreaker::new(name, config)
                        .with_clock(SharedClock(self.clock.clone()))
                        .with_observer(SharedObserver(self.observer.clone())),
                )
            })
            .clone()
    }

    /// Existing breaker for `name`, if any. Never creates.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Reset the named breaker to closed with zeroed counters.
    pub fn reset(&self, name: &str) -> Result<(), RegistryError> {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                Ok(())
            }
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    /// Reset every registered breaker.
    pub fn reset_all(&self) {
        let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
        for breaker in breakers.values() {
            breaker.reset();
        }
    }

    /// Registered names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Metric snapshot for every registered breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, BreakerMetrics)> {
        let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<(String, BreakerMetrics)> = breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.metrics()))
            .collect();
        drop(breakers);
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.breakers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Adapter so an already-shared clock can be handed to a breaker builder
/// that takes ownership.
#[derive(Debug, Clone)]
struct SharedClock(Arc<dyn Clock>);

impl Clock for SharedClock {
    fn now_millis(&self) -> u64 {
        self.0.now_millis()
    }
}

#[derive(Clone)]
struct SharedObserver(Arc<dyn ResilienceObserver>);

impl ResilienceObserver for SharedObserver {
    fn on_state_change(
        &self,
        breaker: &str,
        from: crate::circuit_breaker::CircuitState,
        to: crate::circuit_breaker::CircuitState,
    ) {
        self.0.on_state_change(breaker, from, to);
    }

    fn on_metric(&self, breaker: &str, metrics: &BreakerMetrics) {
        self.0.on_metric(breaker, metrics);
    }

    fn on_retry(&self, attempt: usize, delay: std::time::Duration, error: &dyn std::error::Error) {
        self.0.on_retry(attempt, delay, error);
    }

    fn on_limit_exceeded(&self, key: &str, info: &crate::rate_limit::RateLimitInfo) {
        self.0.on_limit_exceeded(key, info);
    }

    fn on_reject(&self, resource: &str, metrics: &crate::bulkhead::BulkheadMetrics) {
        self.0.on_reject(resource, metrics);
    }
}
