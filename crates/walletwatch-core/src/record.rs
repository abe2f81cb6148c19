//! Persistence and broadcast payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::Amount;
use crate::chain::ChainFamily;
use crate::matcher::WalletMatch;
use crate::wallet::TrackedWallet;

/// Transaction classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Transfer,
    TokenTransfer,
    Swap,
    Initialize,
    ContractCall,
    Other,
}

/// Execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// No receipt / execution meta yet.
    Pending,
    Success,
    Failed,
}

/// Chain-independent view of a matched transaction.
///
/// Built once by the match engine and never mutated; the same value is
/// posted to storage and embedded in the `TRANSACTION` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTransactionRecord {
    pub chain: ChainFamily,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    /// Normalized addresses of the matched wallets. Never empty.
    pub wallets: Vec<String>,
    pub block_time: Option<Amount>,
    pub block_number: Option<Amount>,
    pub fee: Option<Amount>,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub status: TxStatus,
    pub value: Option<Amount>,
    pub token_amount: Option<Amount>,
    pub token_address: Option<String>,
    /// The resolved transaction exactly as the node returned it.
    #[serde(default)]
    pub raw: Value,
}

/// `data` of a `TRANSACTION` message.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPayload {
    pub hash: String,
    pub transaction: NormalizedTransactionRecord,
    pub wallets: Vec<WalletMatch>,
    pub logs: Vec<String>,
}

/// Envelope pushed to every connected live-update client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    TrackedWallets(Vec<TrackedWallet>),
    Transaction(Box<TransactionPayload>),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::TrackedWallets(_) => "TRACKED_WALLETS",
            ServerMessage::Transaction(_) => "TRANSACTION",
        }
    }

    /// Single-line JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
