use std::time::Duration;

/// Reconnect schedule: `min(max, base * 2^(attempt-1))`, no jitter.
///
/// The attempt counter only goes back to zero through [`ReconnectBackoff::reset`], which the
/// feed calls when a channel reaches `Subscribed`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Delay for a given attempt number (1-based). Attempt 0 has no delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let shift = (attempt - 1).min(63);
        let delay_ms = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        Duration::from_millis(delay_ms)
    }

    /// Counts a failed connection and returns `(attempt, delay)` for the next try.
    pub fn next_delay(&mut self) -> (u32, Duration) {
        self.attempt = self.attempt.saturating_add(1);
        (self.attempt, self.delay_for(self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
