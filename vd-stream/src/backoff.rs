//! Reconnection backoff policy.
//!
//! Delays follow the sequence 1s, 2s, 4s, 8s, 16s and then hold at the
//! 30s cap for every later retry. The delay is a pure function of the
//! retry count; reconnect timing carries no jitter or other randomness.

use std::time::Duration;

use vd_core::constants;

/// Exponent clamp. Any retry count at or above this hits the cap.
const MAX_EXPONENT: u32 = 5;

/// Exponential backoff policy for stream reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay for the first wait.
    pub base: Duration,
    /// Upper bound for every wait.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(constants::BACKOFF_BASE_DELAY_MS),
            max: Duration::from_millis(constants::BACKOFF_MAX_DELAY_MS),
        }
    }
}

impl BackoffPolicy {
    /// Compute the wait before the next connection attempt.
    ///
    /// `delay = min(max, base * 2^retry_count)`, with the exponent
    /// clamped so arbitrarily large retry counts cannot overflow.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32 << retry_count.min(MAX_EXPONENT);
        (self.base * factor).min(self.max)
    }
}
