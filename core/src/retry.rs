use std::time::Duration;

/// Bounded exponential backoff: `base * 2^attempt`, capped at `max`, for at
/// most `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self { base, max, max_retries }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Whether another retry is allowed after `attempt` retries.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10), 5)
    }
}
