//! Rate-limited transaction resolution with a fixed retry budget.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter::{ChainAdapter, RawEvent};
use crate::error::{FetchError, TransportError};
use crate::policy::{RateLimiter, RetryConfig};
use crate::transport::{call_optional, RpcTransport};

/// Resolves a bare event identifier into a full transaction.
///
/// Every attempt takes one token from the shared [`RateLimiter`] (waiting if
/// the bucket is empty) and is bounded by [`RetryConfig::attempt_timeout`].
/// A timeout, a transport error, or (when `retry_on_missing` is set) a
/// `null` result counts against the attempt budget.
pub struct TransactionFetcher {
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    retry_on_missing: bool,
}

impl TransactionFetcher {
    pub fn new(limiter: Arc<RateLimiter>, retry: RetryConfig) -> Self {
        Self {
            limiter,
            retry,
            retry_on_missing: false,
        }
    }

    /// Treat "node returned no transaction" as a retryable failure instead of
    /// a terminal [`FetchError::NoTransactionData`]. Nodes that index with a
    /// lag (confirmed-commitment lookups) need this.
    pub fn retry_on_missing(mut self, retry: bool) -> Self {
        self.retry_on_missing = retry;
        self
    }

    /// Resolve `event` through `adapter`, then run the adapter's follow-up
    /// call if it asks for one. Every RPC call goes through [`Self::fetch`],
    /// so each costs one limiter token.
    pub async fn resolve<A: ChainAdapter>(
        &self,
        adapter: &A,
        transport: &dyn RpcTransport,
        event: &RawEvent,
    ) -> Result<A::Transaction, FetchError> {
        let mut tx = self
            .fetch(&event.id, || adapter.resolve_transaction(transport, event))
            .await?;

        if let Some(call) = adapter.follow_up(&tx) {
            let result: Value = self
                .fetch(&event.id, || {
                    call_optional(transport, 2, call.method, call.params.clone())
                })
                .await?;
            adapter
                .apply_follow_up(&mut tx, result)
                .map_err(|source| FetchError::MalformedFollowUp {
                    id: event.id.clone(),
                    source,
                })?;
        }
        Ok(tx)
    }

    /// Run `attempt` until it yields a transaction or the budget is spent.
    pub async fn fetch<T, F, Fut>(&self, id: &str, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, TransportError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let timeout_ms = self.retry.attempt_timeout.as_millis() as u64;
        let mut last = String::new();

        for n in 1..=max_attempts {
            self.limiter.acquire().await;

            match tokio::time::timeout(self.retry.attempt_timeout, attempt()).await {
                Ok(Ok(Some(tx))) => {
                    tracing::debug!(id, attempt = n, "transaction resolved");
                    return Ok(tx);
                }
                Ok(Ok(None)) if !self.retry_on_missing => {
                    return Err(FetchError::NoTransactionData { id: id.to_string() });
                }
                Ok(Ok(None)) => last = "transaction not found".to_string(),
                Ok(Err(e)) => last = e.to_string(),
                Err(_) => last = TransportError::Timeout { ms: timeout_ms }.to_string(),
            }

            if self.retry.should_retry(n) {
                tracing::warn!(
                    id,
                    attempt = n,
                    delay_ms = self.retry.delay.as_millis() as u64,
                    error = %last,
                    "fetch attempt failed, retrying"
                );
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        Err(FetchError::Exhausted {
            id: id.to_string(),
            attempts: max_attempts,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RateLimiterConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn fetcher() -> TransactionFetcher {
        TransactionFetcher::new(
            Arc::new(RateLimiter::new(RateLimiterConfig::per_second(100, 100))),
            RetryConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let got = fetcher()
            .fetch("sig", move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(TransportError::Http("502".into()))
                    } else {
                        Ok(Some(n))
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(got, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn three_timeouts_exhaust_the_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = Instant::now();
        let err = fetcher()
            .fetch::<u32, _, _>("S", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Some(1))
                }
            })
            .await
            .unwrap_err();

        match err {
            FetchError::Exhausted { id, attempts, last } => {
                assert_eq!(id, "S");
                assert_eq!(attempts, 3);
                assert!(last.contains("timed out"), "{last}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 3 × 15 s timeouts + 2 × 2 s delays.
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(49) && elapsed < Duration::from_secs(50),
            "{elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_transaction_is_terminal_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = fetcher()
            .fetch::<u32, _, _>("0xhash", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(None) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoTransactionData { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_transaction_retried_when_enabled() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let got = fetcher()
            .retry_on_missing(true)
            .fetch("sig", move || {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok((n == 2).then_some("tx")) }
            })
            .await
            .unwrap();
        assert_eq!(got, "tx");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn each_attempt_consumes_a_token() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::window(
            5,
            Duration::from_secs(3600),
        )));
        let f = TransactionFetcher::new(limiter.clone(), RetryConfig::default());
        let _ = f
            .fetch::<u32, _, _>("x", || async { Err(TransportError::Http("down".into())) })
            .await;
        // 5 tokens minus 3 attempts, plus a negligible refill over 4 s.
        let left = limiter.wait_time();
        assert_eq!(left, Duration::ZERO);
        for _ in 0..2 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }
}
