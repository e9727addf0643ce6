//! # Retry
//!
//! Fixed-interval retry policy for the readiness patch. No backoff, so the
//! worst-case delay is `delay * (max_attempts - 1)`.
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedRetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl FixedRetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Whether another attempt follows `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Worst-case time spent sleeping across all attempts.
    pub fn max_total_delay(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

impl Default for FixedRetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}
