//! Jitter strategies that decorrelate retry storms.
//!
//! - `None`: deterministic delays, for tests and tightly controlled flows.
//! - `Full`: uniform in `[0, delay]`. The default; spreads simultaneous
//!   retriers across the whole backoff interval.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor under the delay.
//!
//! Millisecond conversions saturate instead of panicking on absurd inputs.

use rand::{rng, Rng};
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Use the exact backoff delay.
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay/2, delay]`.
    Equal,
}

impl Jitter {
    /// Full jitter, the recommended default.
    pub fn full() -> Self {
        Jitter::Full
    }

    /// Equal jitter.
    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Randomize a delay with the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Randomize a delay with an injected RNG, for deterministic tests.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = saturating_millis(delay);
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(0..=millis))
            }
            Jitter::Equal => {
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(millis / 2..=millis))
            }
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
