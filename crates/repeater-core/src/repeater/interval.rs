//! Interval strategies: delay between passes.

use std::time::Duration;

use rand::Rng;

/// Maps the number of the pass that just finished (1-indexed) to the delay
/// before the next one. `Duration::ZERO` means "next pass right away".
///
/// Plain closures `Fn(u32) -> Duration` are strategies.
pub trait IntervalStrategy: Send + Sync {
    fn delay_for(&self, pass: u32) -> Duration;
}

impl<F> IntervalStrategy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay_for(&self, pass: u32) -> Duration {
        self(pass)
    }
}

/// Default: no delay between passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl IntervalStrategy for NoDelay {
    fn delay_for(&self, _pass: u32) -> Duration {
        Duration::ZERO
    }
}

/// Same delay after every pass.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl IntervalStrategy for FixedDelay {
    fn delay_for(&self, _pass: u32) -> Duration {
        self.0
    }
}

/// `pass * step`: 10ms, 20ms, 30ms, ... for a 10ms step.
#[derive(Debug, Clone, Copy)]
pub struct LinearDelay {
    pub step: Duration,
}

impl IntervalStrategy for LinearDelay {
    fn delay_for(&self, pass: u32) -> Duration {
        self.step.saturating_mul(pass)
    }
}

/// Exponential backoff between passes.
///
/// delay = base_delay * multiplier^(pass - 1), capped at `max_delay`.
/// With `jitter`, the actual delay is drawn uniformly from `[0, delay]`.
///
/// Example with base_delay=2s, multiplier=2.0:
/// - after pass 1: 2s
/// - after pass 2: 4s
/// - after pass 3: 8s
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Option<Duration>,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: None,
            jitter: false,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before jitter is applied.
    pub fn ceiling(&self, pass: u32) -> Duration {
        let exponent = pass.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.unwrap_or(Duration::MAX);
        // try_from_secs_f64 rejects NaN, negatives and overflow
        Duration::try_from_secs_f64(secs).map_or(max, |d| d.min(max))
    }
}

impl IntervalStrategy for ExponentialBackoff {
    fn delay_for(&self, pass: u32) -> Duration {
        let ceiling = self.ceiling(pass);
        if self.jitter && !ceiling.is_zero() {
            rand::thread_rng().gen_range(Duration::ZERO..=ceiling)
        } else {
            ceiling
        }
    }
}
