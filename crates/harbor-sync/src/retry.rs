//! Retry accounting and backoff delays.

use std::time::Duration;

/// Ceiling for any single backoff delay.
const MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Deterministic exponential backoff: `base · 2^attempt`, capped at 30 s.
///
/// Also owns the retry ceiling: a queue item whose `retry_count` reaches
/// `max_retries` is dead and excluded from further pushes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy from a base delay in milliseconds and a retry cap.
    pub fn new(base_delay_ms: u64, max_retries: u32) -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(base_delay_ms),
            max_retries,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self
            .base_delay
            .as_millis()
            .saturating_mul(u128::from(factor));
        if delay >= MAX_DELAY.as_millis() {
            MAX_DELAY
        } else {
            Duration::from_millis(delay as u64)
        }
    }

    /// True once an item has used up every allowed attempt.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// The retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
