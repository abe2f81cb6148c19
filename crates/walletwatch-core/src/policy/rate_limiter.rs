//! Token bucket rate limiter.
//!
//! Tokens accrue at `refill_rate` tokens/second up to `capacity`; each call
//! consumes one. `try_acquire` never blocks, `acquire` waits until a token
//! is available, so callers queue behind the limiter instead of failing.
//!
//! Time is read from `tokio::time`, which lets paused-clock tests drive
//! refill deterministically.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum tokens in the bucket.
    pub capacity: f64,
    /// Token refill rate (tokens per second).
    pub refill_rate: f64,
}

impl RateLimiterConfig {
    /// Burst of `capacity`, refilled at `per_sec` tokens per second.
    pub fn per_second(capacity: u32, per_sec: u32) -> Self {
        Self {
            capacity: f64::from(capacity.max(1)),
            refill_rate: f64::from(per_sec.max(1)),
        }
    }

    /// At most `calls` calls per `period`, refilled smoothly.
    pub fn window(calls: u32, period: Duration) -> Self {
        let calls = f64::from(calls.max(1));
        let secs = period.as_secs_f64().max(0.001);
        Self {
            capacity: calls,
            refill_rate: calls / secs,
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::per_second(50, 50)
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
pub struct TokenBucket {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Try to take `cost` tokens. Returns `false` if the bucket is short.
    pub fn try_acquire(&self, cost: f64) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);

        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Estimated wait before `cost` tokens are available.
    pub fn wait_time(&self, cost: f64) -> Duration {
        let mut state = self.lock();
        self.refill(&mut state);
        let deficit = cost - state.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / self.config.refill_rate)
        }
    }

    /// Currently available tokens.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.refill_rate).min(self.config.capacity);
        state.last_refill = now;
    }
}

/// One-token-per-call limiter shared by every fetch and subscription send of
/// a pipeline.
pub struct RateLimiter {
    bucket: TokenBucket,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.bucket.try_acquire(1.0)
    }

    /// Wait time before the next token is available.
    pub fn wait_time(&self) -> Duration {
        self.bucket.wait_time(1.0)
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            if self.bucket.try_acquire(1.0) {
                return;
            }
            // Floor the sleep so rounding never spins the loop.
            let wait = self.bucket.wait_time(1.0).max(Duration::from_millis(1));
            tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limited, waiting for token");
            tokio::time::sleep(wait).await;
        }
    }
}
