use std::time::Duration;

/// Caller-side retry policy for `SeqLock::load_with_retry`.
///
/// The lock itself never waits; this only decides how long a reader backs off
/// after `Busy` or `TornRead`. A write window is a single payload copy, so the
/// defaults start in the microsecond range:
/// - 32 attempts with 1µs base delay
/// - Exponential backoff capped at 500µs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of load attempts (at least one is always made)
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt).
    /// Zero means spin instead of sleeping.
    pub base_delay: Duration,
    /// Maximum delay cap (backoff won't exceed this)
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 32,
            base_delay: Duration::from_micros(1),
            max_delay: Duration::from_micros(500),
        }
    }
}

impl RetryConfig {
    /// Retry as fast as possible, never sleeping.
    pub fn spinning(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate delay for a given attempt using exponential backoff
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Block the current thread for the backoff of `attempt`.
    pub(crate) fn backoff(&self, attempt: u32) {
        let delay = self.delay_for_attempt(attempt);
        if delay.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(delay);
        }
    }
}
