//! Persistence sink for matched transactions.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::NormalizedTransactionRecord;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persistence request failed: {0}")]
    Http(String),

    #[error("persistence endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Destination for normalized records. Called once per match; callers log
/// failures and move on.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn persist(&self, record: &NormalizedTransactionRecord) -> Result<(), PersistError>;
}
