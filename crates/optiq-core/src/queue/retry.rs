//! Backoff policies: how long a failed message stays hidden before retry.

use std::fmt::Debug;
use std::time::Duration;

use rand::Rng;

/// Delay before the next attempt, given the attempts already made.
///
/// Implementations must be non-decreasing in `attempts`. Nothing else about
/// the curve is assumed by the engine.
pub trait BackoffPolicy: Send + Sync + Debug {
    fn delay(&self, attempts: u32) -> Duration;
}

/// Same delay for every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Retry as soon as the next poll picks the message up.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _attempts: u32) -> Duration {
        self.delay
    }
}

/// `base * multiplier^(attempts - 1)`, capped at `max`.
///
/// With base=1s, multiplier=2.0: 1s, 2s, 4s, 8s, ...
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier: multiplier.max(1.0),
            max,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(300))
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Adds up to `ratio * floor` of random delay on top of `inner`.
///
/// Spreads out retries of messages that failed together. The floor stays
/// non-decreasing; individual samples can overlap between neighbouring
/// attempts.
#[derive(Debug, Clone)]
pub struct JitteredBackoff<P> {
    inner: P,
    ratio: f64,
}

impl<P: BackoffPolicy> JitteredBackoff<P> {
    pub fn new(inner: P, ratio: f64) -> Self {
        Self {
            inner,
            ratio: ratio.clamp(0.0, 1.0),
        }
    }
}

impl<P: BackoffPolicy> BackoffPolicy for JitteredBackoff<P> {
    fn delay(&self, attempts: u32) -> Duration {
        let floor = self.inner.delay(attempts);
        let spread = floor.as_secs_f64() * self.ratio;
        if spread <= 0.0 {
            return floor;
        }
        let extra = rand::thread_rng().gen_range(0.0..spread);
        floor + Duration::from_secs_f64(extra)
    }
}
