//! Reliability policies shared by every pipeline stage.
//!
//! ```text
//! RawEvent → [RateLimiter] → [RetryConfig: attempt timeout + fixed delay] → Transport
//! upstream socket closed → [Backoff] → reconnect
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig, TokenBucket};
pub use retry::{Backoff, RetryConfig};
