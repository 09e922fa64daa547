//! Backoff strategies for retry delays.
//!
//! Attempt semantics: attempt `0` is the initial call and carries no delay;
//! retries start at attempt `1`. All computations saturate at [`MAX_BACKOFF`]
//! so pathological attempt counts or bases never panic or overflow.
//!
//! ```rust
//! use std::time::Duration;
//! use meshguard::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100), 2.0)
//!     .unwrap()
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(10), Duration::from_secs(2)); // capped
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Hard ceiling applied when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from backoff configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("multiplier must be >= 1.0 and finite (got {0})")]
    InvalidMultiplier(f64),
    #[error("with_max is only valid for linear or exponential backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant { delay: Duration },
    Linear { base: Duration, max: Option<Duration> },
    Exponential { base: Duration, multiplier: f64, max: Option<Duration> },
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// Delay grows by `base` each retry: `base`, `2*base`, `3*base`, ...
    pub fn linear(base: Duration) -> Self {
        Self { kind: BackoffKind::Linear { base, max: None } }
    }

    /// Delay grows geometrically: `base`, `base*multiplier`,
    /// `base*multiplier^2`, ... Multiplier must be finite and >= 1.0.
    pub fn exponential(base: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        Ok(Self { kind: BackoffKind::Exponential { base, multiplier, max: None } })
    }

    /// Cap the delay for linear or exponential schedules.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Linear { base, max: existing }
            | BackoffKind::Exponential { base, max: existing, .. } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay before the given attempt (0 = initial call, always zero).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match &self.kind {
            BackoffKind::Constant { delay } => *delay,
            BackoffKind::Linear { base, max } => {
                let n = attempt.min(u32::MAX as usize) as u32;
                let raw = base.checked_mul(n).unwrap_or(MAX_BACKOFF);
                cap(raw, *max)
            }
            BackoffKind::Exponential { base, multiplier, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                let raw = if secs.is_finite() && secs < MAX_BACKOFF.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    MAX_BACKOFF
                };
                cap(raw, *max)
            }
        }
    }
}

fn cap(delay: Duration, max: Option<Duration>) -> Duration {
    let capped = max.map(|m| delay.min(m)).unwrap_or(delay);
    capped.min(MAX_BACKOFF)
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BackoffKind::Constant { delay } => write!(f, "constant({:?})", delay),
            BackoffKind::Linear { base, .. } => write!(f, "linear({:?})", base),
            BackoffKind::Exponential { base, multiplier, .. } => {
                write!(f, "exponential({:?} x{})", base, multiplier)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_ignores_attempt_number() {
        let backoff = Backoff::constant(Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(50), Duration::from_secs(1));
    }

    #[test]
    fn linear_grows_by_base() {
        let backoff = Backoff::linear(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(7), Duration::from_millis(700));
    }

    #[test]
    fn exponential_doubles_with_multiplier_two() {
        let backoff = Backoff::exponential(Duration::from_millis(100), 2.0).unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn exponential_honors_fractional_multiplier() {
        let backoff = Backoff::exponential(Duration::from_millis(100), 1.5).unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(150));
        assert_eq!(backoff.delay(3), Duration::from_millis(225));
    }

    #[test]
    fn exponential_caps_at_max() {
        let backoff = Backoff::exponential(Duration::from_millis(100), 2.0)
            .unwrap()
            .with_max(Duration::from_secs(1))
            .unwrap();
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(64), Duration::from_secs(1));
    }

    #[test]
    fn huge_attempts_saturate() {
        let backoff = Backoff::exponential(Duration::from_secs(1), 2.0).unwrap();
        assert_eq!(backoff.delay(1_000_000), MAX_BACKOFF);

        let linear = Backoff::linear(Duration::from_secs(u64::MAX / 2));
        assert_eq!(linear.delay(1_000_000), MAX_BACKOFF);
    }

    #[test]
    fn invalid_multiplier_rejected() {
        assert!(matches!(
            Backoff::exponential(Duration::from_millis(10), 0.5),
            Err(BackoffError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            Backoff::exponential(Duration::from_millis(10), f64::NAN),
            Err(BackoffError::InvalidMultiplier(_))
        ));
    }

    #[test]
    fn with_max_validation() {
        assert!(matches!(
            Backoff::constant(Duration::from_secs(1)).with_max(Duration::from_secs(2)),
            Err(BackoffError::ConstantDoesNotSupportMax)
        ));
        assert!(matches!(
            Backoff::linear(Duration::from_secs(5)).with_max(Duration::ZERO),
            Err(BackoffError::MaxMustBePositive)
        ));
        assert!(matches!(
            Backoff::linear(Duration::from_secs(5)).with_max(Duration::from_secs(1)),
            Err(BackoffError::MaxLessThanBase { .. })
        ));
    }

    #[test]
    fn zero_base_stays_zero() {
        let backoff = Backoff::exponential(Duration::ZERO, 2.0).unwrap();
        assert_eq!(backoff.delay(10), Duration::ZERO);
    }
}
