//! Exponential reconnect backoff

use std::time::Duration;

/// Default delay before the first reconnect attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
/// Default upper bound for the reconnect delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5000);

/// Reconnect counter and delay policy
///
/// The delay for attempt `n` (counted since the last successful open) is
/// `min(base * 2^n, max)`. The counter only grows; it is reset explicitly.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    /// Create a backoff with the given base and maximum delay
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    /// Delay for a given zero-indexed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Compute the delay for the current attempt and advance the counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Reset the counter after a successful open or an explicit disconnect
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive reconnect attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The first `count` delays of the schedule
    pub fn schedule(&self, count: u32) -> Vec<Duration> {
        (0..count).map(|attempt| self.delay_for(attempt)).collect()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
