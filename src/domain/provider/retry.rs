//! Backoff schedule for transient failures.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// The delay before retry `n` (zero-based) is `base_delay * multiplier^n`,
/// replaced by the provider's retry-after hint when one was given, capped at
/// `max_delay`, then spread by `±jitter_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay used as jitter range (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Disables jitter, for deterministic schedules.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Undithered delay before the given retry.
    pub fn nominal_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(hint) => hint,
            None => {
                let millis =
                    self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
                Duration::from_millis(millis.min(u64::MAX as f64) as u64)
            }
        };
        delay.min(self.max_delay)
    }

    /// Delay before the given retry, jitter included.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.nominal_delay(attempt, retry_after);
        let factor = self.jitter_factor.clamp(0.0, 1.0);
        if factor == 0.0 || delay.is_zero() {
            return delay;
        }

        let range = delay.as_millis() as f64 * factor;
        let jitter = rand::thread_rng().gen_range(-range..=range);
        let millis = (delay.as_millis() as f64 + jitter).max(0.0);
        Duration::from_millis(millis as u64)
    }
}
