//! Retry budget for fetches and backoff for reconnects.

use std::time::Duration;

/// Fixed-delay retry budget applied to every transaction fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay between a failed attempt and the next one.
    pub delay: Duration,
    /// Upper bound on a single attempt; exceeding it counts as a failure.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    /// Returns `true` if another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Capped exponential backoff, used between upstream reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Give up after this many consecutive attempts. `0` disables retrying.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before the `attempt`-th retry (1-based), or `None` once the
    /// budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let base_ms = self.initial.as_millis() as f64 * self.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.max.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}
