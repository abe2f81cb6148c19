//! Error types shared across the ingestion path.

use thiserror::Error;

use crate::chain::ChainFamily;
use crate::request::JsonRpcError;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

/// A wallet address that failed validation for its chain family.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("`{address}` is not a valid {family} address: {reason}")]
    Invalid {
        address: String,
        family: ChainFamily,
        reason: String,
    },

    #[error("`{0}` does not match any supported chain family")]
    UnknownFamily(String),
}

/// Terminal outcomes of [`crate::TransactionFetcher::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt in the retry budget failed.
    #[error("fetch exhausted for {id} after {attempts} attempts: {last}")]
    Exhausted {
        id: String,
        attempts: u32,
        last: String,
    },

    /// The node answered but has no transaction for this identifier yet.
    #[error("no transaction data returned for {id}")]
    NoTransactionData { id: String },

    /// A follow-up lookup returned something the adapter cannot read.
    #[error("malformed follow-up result for {id}: {source}")]
    MalformedFollowUp {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_display() {
        let err = TransportError::Rpc(JsonRpcError {
            code: -32602,
            message: "invalid params".into(),
            data: None,
        });
        assert_eq!(err.to_string(), "RPC error -32602: invalid params");
    }

    #[test]
    fn exhausted_names_the_identifier() {
        let err = FetchError::Exhausted {
            id: "5sig".into(),
            attempts: 3,
            last: "timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "fetch exhausted for 5sig after 3 attempts: timeout"
        );
    }
}
