//! `getTransaction` result in `json` encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use walletwatch_core::amount::Amount;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTransaction {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub block_time: Option<u64>,
    pub transaction: TransactionEnvelope,
    /// Absent until the transaction has executed.
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(default)]
    pub signatures: Vec<String>,
    pub message: Message,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub account_keys: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<CompiledInstruction>,
}

/// Program and accounts are indices into the participant-key list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    #[serde(default)]
    pub program_id_index: usize,
    #[serde(default)]
    pub accounts: Vec<usize>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    /// Raw units as a decimal string.
    pub amount: String,
    #[serde(default)]
    pub decimals: u8,
}

impl TokenBalance {
    pub fn raw_amount(&self) -> Amount {
        Amount::parse(&self.ui_token_amount.amount).unwrap_or(Amount::ZERO)
    }
}

impl SolanaTransaction {
    /// Static account keys followed by lookup-table writable then readonly
    /// keys, the order instruction indices refer to.
    pub fn participant_keys(&self) -> Vec<&str> {
        let message = &self.transaction.message;
        let loaded = self.meta.as_ref().and_then(|m| m.loaded_addresses.as_ref());
        message
            .account_keys
            .iter()
            .chain(loaded.into_iter().flat_map(|l| l.writable.iter().chain(l.readonly.iter())))
            .map(String::as_str)
            .collect()
    }

    /// Program id of every top-level instruction that resolves to a key.
    pub fn invoked_programs(&self) -> Vec<&str> {
        let keys = self.participant_keys();
        self.transaction
            .message
            .instructions
            .iter()
            .filter_map(|ix| keys.get(ix.program_id_index).copied())
            .collect()
    }

    pub fn log_messages(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.log_messages.as_deref())
            .unwrap_or_default()
    }

    pub fn signature(&self) -> Option<&str> {
        self.transaction.signatures.first().map(String::as_str)
    }
}

/// A fetched transaction along with the untouched node payload.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSolanaTransaction {
    pub transaction: SolanaTransaction,
    #[serde(skip)]
    pub raw: Value,
}

impl ResolvedSolanaTransaction {
    pub fn from_raw(raw: Value) -> Result<Self, serde_json::Error> {
        let transaction = serde_json::from_value(raw.clone())?;
        Ok(Self { transaction, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn versioned() -> SolanaTransaction {
        serde_json::from_value(json!({
            "slot": 250000000,
            "blockTime": 1700000000,
            "transaction": {
                "signatures": ["5sig"],
                "message": {
                    "accountKeys": ["A", "B", "C"],
                    "instructions": [{ "programIdIndex": 2, "accounts": [0, 3, 4], "data": "" }]
                }
            },
            "meta": {
                "err": null,
                "fee": 5000,
                "loadedAddresses": { "writable": ["D"], "readonly": ["E"] },
                "logMessages": ["Program C invoke [1]"]
            }
        }))
        .unwrap()
    }

    #[test]
    fn loaded_addresses_extend_keys_in_order() {
        let tx = versioned();
        assert_eq!(tx.participant_keys(), vec!["A", "B", "C", "D", "E"]);
        assert_eq!(tx.invoked_programs(), vec!["C"]);
        assert_eq!(tx.signature(), Some("5sig"));
    }

    #[test]
    fn null_err_is_none() {
        let meta = versioned().meta.unwrap();
        assert!(meta.err.is_none());
        assert_eq!(meta.fee, Some(5000));
    }

    #[test]
    fn missing_meta_has_no_logs() {
        let tx: SolanaTransaction = serde_json::from_value(json!({
            "transaction": { "message": { "accountKeys": ["A"] } }
        }))
        .unwrap();
        assert!(tx.meta.is_none());
        assert!(tx.log_messages().is_empty());
    }
}
