//! Clock abstraction shared by the circuit breaker and rate limiters.

use std::time::Instant;

/// Source of the current time in milliseconds, injectable for deterministic tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds elapsed since some fixed origin.
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// The origin is the moment the clock was created, so values are only
/// comparable within one clock instance. State does not survive restarts.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_advances() {
        let clock = MonotonicClock::default();
        let first = clock.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now_millis() >= first);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = test_support::ManualClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 250);
    }
}
