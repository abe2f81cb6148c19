//! Storage API client.

use async_trait::async_trait;
use std::time::Duration;

use walletwatch_core::error::TransportError;
use walletwatch_core::record::NormalizedTransactionRecord;
use walletwatch_core::sink::{PersistError, TransactionSink};

use crate::client::build_http;

const TRANSACTIONS_PATH: &str = "/api/transactions";

/// Posts each matched record once. No retry: a failed write is reported to
/// the caller, which logs it.
pub struct HttpPersister {
    url: String,
    http: reqwest::Client,
}

impl HttpPersister {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            url: format!("{}{TRANSACTIONS_PATH}", base_url.trim_end_matches('/')),
            http: build_http(timeout)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TransactionSink for HttpPersister {
    async fn persist(&self, record: &NormalizedTransactionRecord) -> Result<(), PersistError> {
        let resp = self
            .http
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| PersistError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PersistError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(hash = %record.hash, "transaction persisted");
        Ok(())
    }
}
