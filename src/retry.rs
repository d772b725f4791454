//! A module which contains the retry coordinator, the policy deciding how long a proposer waits
//! before re-attempting a round after the previous one went nowhere.

use std::time::Duration;

/// A policy which turns the index of a permission-request emission into the delay to apply before
/// it. Emission 0 is the initial proposal: it always fires immediately, whatever the policy; only
/// subsequent emissions are retries and incur the delay schedule.
pub trait RetryCoordinator: Send {
    fn delay_for(&mut self, emission: u32) -> Duration;
}

/// No delays at all: every re-attempt fires as soon as its round is ready.
pub struct NoopRetry;

impl RetryCoordinator for NoopRetry {
    fn delay_for(&mut self, _emission: u32) -> Duration {
        Duration::from_millis(0)
    }
}

/// Delays the nth emission by `initial * multiplier^n`.
pub struct IncrementalBackoff {
    initial: Duration,

    multiplier: f64,
}

impl IncrementalBackoff {
    pub fn new(initial: Duration, multiplier: f64) -> Self {
        IncrementalBackoff {
            initial,
            multiplier,
        }
    }
}

impl RetryCoordinator for IncrementalBackoff {
    fn delay_for(&mut self, emission: u32) -> Duration {
        if emission == 0 {
            return Duration::from_millis(0);
        }

        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(emission as i32);
        Duration::from_millis(millis.round() as u64)
    }
}

/// Delays the nth emission by `2^n * 100ms`.
pub struct ExponentialBackoff {
    inner: IncrementalBackoff,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        ExponentialBackoff {
            inner: IncrementalBackoff::new(Duration::from_millis(100), 2.0),
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoff::new()
    }
}

impl RetryCoordinator for ExponentialBackoff {
    fn delay_for(&mut self, emission: u32) -> Duration {
        self.inner.delay_for(emission)
    }
}
