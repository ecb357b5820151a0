//! Retry policy for idempotent store operations

use rand::Rng;
use std::time::Duration;

/// Exponential backoff: `base * 2^attempt` plus up to 100 ms of jitter.
///
/// Only idempotent operations retry, and only on transient failures
/// (5xx, 429, network). A 409 on directory create is success, not a
/// retry; a 409 on move is surfaced for the caller to decide.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self { max_attempts, base }
    }

    /// True when `attempt` (0-based, already failed) leaves another try.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Delay before retrying after 0-based `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let jitter = rand::thread_rng().gen_range(0..100);
        exp + Duration::from_millis(jitter)
    }
}
