//! JSON-RPC shapes of transactions and receipts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use walletwatch_core::amount::Amount;

/// `eth_getTransactionByHash` result. Only the fields the adapter reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransaction {
    #[serde(default)]
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<Amount>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub gas_price: Option<Amount>,
    /// `None` while the transaction is still in the mempool.
    #[serde(default)]
    pub block_number: Option<Amount>,
}

impl EvmTransaction {
    /// Calldata without the `0x` prefix.
    pub fn calldata_hex(&self) -> &str {
        let input = self.input.trim();
        input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input)
    }

    pub fn has_calldata(&self) -> bool {
        !self.calldata_hex().is_empty()
    }

    /// Lowercase `0x`-prefixed 4-byte selector, if the calldata has one.
    pub fn selector(&self) -> Option<String> {
        let data = self.calldata_hex();
        (data.len() >= 8 && data.is_char_boundary(8))
            .then(|| format!("0x{}", data[..8].to_ascii_lowercase()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvmLog {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// `eth_getTransactionReceipt` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    /// `0x1` success, `0x0` revert. Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gas_used: Option<Amount>,
    #[serde(default)]
    pub effective_gas_price: Option<Amount>,
    #[serde(default)]
    pub block_number: Option<Amount>,
    #[serde(default)]
    pub logs: Vec<EvmLog>,
}

impl EvmReceipt {
    pub fn succeeded(&self) -> bool {
        match self.status.as_deref() {
            None => true,
            Some(s) => Amount::parse(s).map(|a| !a.is_zero()).unwrap_or(false),
        }
    }
}

/// A transaction plus its receipt once mined, along with the untouched
/// node payload.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEvmTransaction {
    pub transaction: EvmTransaction,
    pub receipt: Option<EvmReceipt>,
    #[serde(skip)]
    pub raw: Value,
}

impl ResolvedEvmTransaction {
    /// Parse a node payload, keeping it as `raw`.
    pub fn from_raw(raw: Value, receipt: Option<EvmReceipt>) -> Result<Self, serde_json::Error> {
        let transaction = serde_json::from_value(raw.clone())?;
        Ok(Self {
            transaction,
            receipt,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mempool_transaction() {
        let tx: EvmTransaction = serde_json::from_value(json!({
            "hash": "0xfeed",
            "from": "0xABC",
            "to": "0xdef",
            "value": "0x64",
            "input": "0xa9059cbb000000",
            "gasPrice": "0x3b9aca00",
            "blockNumber": null
        }))
        .unwrap();
        assert_eq!(tx.value, Some(Amount::from_u64(100)));
        assert!(tx.block_number.is_none());
        assert_eq!(tx.selector().as_deref(), Some("0xa9059cbb"));
    }

    #[test]
    fn plain_transfer_has_no_selector() {
        let tx: EvmTransaction =
            serde_json::from_value(json!({ "from": "0xabc", "to": "0xdef", "value": "100" })).unwrap();
        assert!(!tx.has_calldata());
        assert!(tx.selector().is_none());
        assert_eq!(tx.value, Some(Amount::from_u64(100)));
    }

    #[test]
    fn receipt_status() {
        let ok: EvmReceipt = serde_json::from_value(json!({ "status": "0x1" })).unwrap();
        let reverted: EvmReceipt = serde_json::from_value(json!({ "status": "0x0" })).unwrap();
        let legacy: EvmReceipt = serde_json::from_value(json!({})).unwrap();
        assert!(ok.succeeded());
        assert!(!reverted.succeeded());
        assert!(legacy.succeeded());
    }
}
