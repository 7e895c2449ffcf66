//! Delay schedules between poll iterations
//!
//! A schedule maps the number of completed iterations to the delay before
//! the next one. The delay before iteration `k` is exactly `delay(k)`:
//! iteration 0 always fires immediately, so `delay(0)` is never consulted by
//! the poller.

use std::fmt;
use std::time::Duration;

use crate::config::{MAX_INTERVAL, SigmoidConfig};
use crate::error::ConfigError;

/// Default delay between iterations of a fixed-interval poller.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Maps a completed iteration count to the delay before the next iteration.
pub trait DelaySchedule: Send + Sync + 'static {
    /// Delay before iteration `iteration`.
    fn delay(&self, iteration: u64) -> Duration;

    /// Schedule name for observability
    fn name(&self) -> &'static str;
}

impl DelaySchedule for Duration {
    fn delay(&self, _iteration: u64) -> Duration {
        *self
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Logistic delay curve: starts small, rises steepest around `midpoint` and
/// approaches `ceiling`.
///
/// `delay(x) = ceiling / (1 + e^(steepness * (midpoint - x)))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidDelay {
    ceiling_ms: f64,
    midpoint: f64,
    steepness: f64,
}

impl SigmoidDelay {
    /// 10 s ceiling, midpoint at iteration 12, steepness 0.2.
    pub const DEFAULT: Self = Self {
        ceiling_ms: 10_000.0,
        midpoint: 12.0,
        steepness: 0.2,
    };

    /// Build a curve from its parameters.
    pub fn new(ceiling: Duration, midpoint: f64, steepness: f64) -> Result<Self, ConfigError> {
        if ceiling.is_zero() {
            return Err(ConfigError::invalid("ceiling", "must be greater than zero"));
        }
        if ceiling > MAX_INTERVAL {
            return Err(ConfigError::invalid(
                "ceiling",
                format!("cannot exceed {MAX_INTERVAL:?}, got {ceiling:?}"),
            ));
        }
        if !midpoint.is_finite() || midpoint < 0.0 {
            return Err(ConfigError::invalid(
                "midpoint",
                format!("must be a finite, non-negative number, got {midpoint}"),
            ));
        }
        if !steepness.is_finite() || steepness <= 0.0 {
            return Err(ConfigError::invalid(
                "steepness",
                format!("must be a finite, positive number, got {steepness}"),
            ));
        }

        Ok(Self {
            ceiling_ms: ceiling.as_secs_f64() * 1000.0,
            midpoint,
            steepness,
        })
    }

    /// Build a curve from configuration.
    pub fn from_config(config: &SigmoidConfig) -> Result<Self, ConfigError> {
        Self::new(config.ceiling, config.midpoint, config.steepness)
    }

    /// Exact curve value in milliseconds.
    #[must_use]
    pub fn millis(&self, iteration: u64) -> f64 {
        let x = iteration as f64;
        self.ceiling_ms / (1.0 + (self.steepness * (self.midpoint - x)).exp())
    }

    /// Asymptotic upper bound of the curve.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        Duration::from_secs_f64(self.ceiling_ms / 1000.0)
    }
}

impl Default for SigmoidDelay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl DelaySchedule for SigmoidDelay {
    fn delay(&self, iteration: u64) -> Duration {
        Duration::from_secs_f64(self.millis(iteration) / 1000.0)
    }

    fn name(&self) -> &'static str {
        "sigmoid"
    }
}

/// Default sigmoid delay before iteration `iteration`.
///
/// ```
/// use skyline_poll::sigmoid_timing;
/// use std::time::Duration;
///
/// assert_eq!(sigmoid_timing(12), Duration::from_secs(5));
/// assert!(sigmoid_timing(100) > Duration::from_millis(9_999));
/// ```
#[must_use]
pub fn sigmoid_timing(iteration: u64) -> Duration {
    SigmoidDelay::DEFAULT.delay(iteration)
}

/// Schedule backed by an arbitrary `iteration -> delay` function.
#[derive(Clone)]
pub struct FnDelay<F> {
    f: F,
}

impl<F> fmt::Debug for FnDelay<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDelay").finish_non_exhaustive()
    }
}

impl<F> DelaySchedule for FnDelay<F>
where
    F: Fn(u64) -> Duration + Send + Sync + 'static,
{
    fn delay(&self, iteration: u64) -> Duration {
        (self.f)(iteration)
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Wrap a function as a delay schedule.
pub fn from_fn<F>(f: F) -> FnDelay<F>
where
    F: Fn(u64) -> Duration + Send + Sync + 'static,
{
    FnDelay { f }
}
