//! [`ChainAdapter`] for account-based chains.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use walletwatch_core::adapter::{ChainAdapter, FollowUp, RawEvent, SubscriptionRequest};
use walletwatch_core::address::Address;
use walletwatch_core::amount::Amount;
use walletwatch_core::chain::ChainFamily;
use walletwatch_core::error::TransportError;
use walletwatch_core::matcher::{Classification, Role, WalletMatch};
use walletwatch_core::record::{NormalizedTransactionRecord, TxStatus, TxType};
use walletwatch_core::registry::WalletSnapshot;
use walletwatch_core::rules::RuleTable;
use walletwatch_core::transport::{call_optional, RpcTransport};

use crate::signature::{self, selector, TRANSFER_EVENT, TRANSFER_FN, TRANSFER_FROM_FN};
use crate::types::{EvmReceipt, ResolvedEvmTransaction};

const PENDING_FEED: &str = "newPendingTransactions";

pub struct EvmAdapter {
    rules: RuleTable,
    transfer_topic: String,
    transfer_selector: String,
    transfer_from_selector: String,
}

impl EvmAdapter {
    pub fn new(rules: RuleTable) -> Self {
        Self {
            rules,
            transfer_topic: signature::event_topic(TRANSFER_EVENT),
            transfer_selector: selector(TRANSFER_FN),
            transfer_from_selector: selector(TRANSFER_FROM_FN),
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Token contract and raw amount of the first ERC-20 transfer: from the
    /// receipt's `Transfer` logs when mined, else decoded from calldata.
    fn token_transfer(&self, tx: &ResolvedEvmTransaction) -> Option<(String, Amount)> {
        if let Some(receipt) = &tx.receipt {
            let from_log = receipt.logs.iter().find_map(|log| {
                // ERC-721 transfers index the token id as a fourth topic.
                let is_erc20 = log.topics.len() == 3
                    && log.topics[0].eq_ignore_ascii_case(&self.transfer_topic);
                if !is_erc20 {
                    return None;
                }
                let amount = Amount::parse(&log.data)?;
                Some((log.address.to_ascii_lowercase(), amount))
            });
            if from_log.is_some() {
                return from_log;
            }
        }

        let t = &tx.transaction;
        let word = match t.selector()? {
            s if s == self.transfer_selector => 1,
            s if s == self.transfer_from_selector => 2,
            _ => return None,
        };
        let calldata = hex::decode(t.calldata_hex()).ok()?;
        let start = 4 + 32 * word;
        let bytes = calldata.get(start..start + 32)?;
        let token = t.to.as_ref()?.to_ascii_lowercase();
        Some((token, Amount(U256::from_be_slice(bytes))))
    }
}

impl Default for EvmAdapter {
    fn default() -> Self {
        Self::new(signature::default_rules())
    }
}

fn normalized(raw: &str) -> String {
    Address::parse(ChainFamily::Evm, raw)
        .map(|a| a.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn fee(receipt: &EvmReceipt, gas_price: Option<Amount>) -> Option<Amount> {
    let price = receipt.effective_gas_price.or(gas_price)?;
    receipt.gas_used?.checked_mul(price)
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    type Transaction = ResolvedEvmTransaction;

    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    /// A single mempool feed covers every wallet.
    fn subscriptions(&self, _snapshot: &WalletSnapshot) -> Vec<SubscriptionRequest> {
        vec![SubscriptionRequest {
            key: PENDING_FEED.to_string(),
            method: "eth_subscribe".to_string(),
            params: vec![json!(PENDING_FEED)],
        }]
    }

    fn unsubscribe_method(&self) -> &'static str {
        "eth_unsubscribe"
    }

    fn parse_event(&self, result: &Value) -> Option<RawEvent> {
        match result {
            Value::String(hash) => Some(RawEvent::new(hash.as_str())),
            // Some nodes push full transaction objects on this feed.
            Value::Object(obj) => obj.get("hash")?.as_str().map(RawEvent::new),
            _ => None,
        }
    }

    async fn resolve_transaction(
        &self,
        transport: &dyn RpcTransport,
        event: &RawEvent,
    ) -> Result<Option<Self::Transaction>, TransportError> {
        let raw: Option<Value> =
            call_optional(transport, 1, "eth_getTransactionByHash", vec![json!(event.id)]).await?;
        raw.map(|raw| ResolvedEvmTransaction::from_raw(raw, None))
            .transpose()
            .map_err(TransportError::Deserialization)
    }

    /// Mined transactions need their receipt for status, gas used and logs.
    fn follow_up(&self, tx: &Self::Transaction) -> Option<FollowUp> {
        let t = &tx.transaction;
        if tx.receipt.is_some() || t.block_number.is_none() || t.hash.is_empty() {
            return None;
        }
        Some(FollowUp {
            method: "eth_getTransactionReceipt",
            params: vec![json!(t.hash)],
        })
    }

    fn apply_follow_up(
        &self,
        tx: &mut Self::Transaction,
        result: Value,
    ) -> Result<(), serde_json::Error> {
        let receipt: EvmReceipt = serde_json::from_value(result)?;
        tracing::trace!(hash = %tx.transaction.hash, status = ?receipt.status, "receipt attached");
        tx.receipt = Some(receipt);
        Ok(())
    }

    /// Sender or recipient equals the wallet, after normalization.
    fn match_wallets(&self, tx: &Self::Transaction, snapshot: &WalletSnapshot) -> Vec<WalletMatch> {
        let t = &tx.transaction;
        std::iter::once(t.from.as_str())
            .chain(t.to.as_deref())
            .filter_map(|addr| snapshot.lookup_raw(addr))
            .map(|wallet| WalletMatch {
                wallet: wallet.clone(),
                role: Role::Participant,
            })
            .collect()
    }

    fn classify(&self, tx: &Self::Transaction) -> Classification {
        let status = match &tx.receipt {
            None => TxStatus::Pending,
            Some(r) if r.succeeded() => TxStatus::Success,
            Some(_) => TxStatus::Failed,
        };

        let selector = tx.transaction.selector();
        let topics = tx
            .receipt
            .iter()
            .flat_map(|r| r.logs.iter())
            .filter_map(|log| log.topics.first())
            .map(|t| t.to_ascii_lowercase());
        let candidates: Vec<String> = selector.into_iter().chain(topics).collect();

        let tx_type = self
            .rules
            .classify(candidates.iter().map(String::as_str))
            .unwrap_or_else(|| {
                match (tx.transaction.to.is_some(), tx.transaction.has_calldata()) {
                    (true, false) => TxType::Transfer,
                    (true, true) => TxType::ContractCall,
                    (false, _) => TxType::Other,
                }
            });

        Classification { tx_type, status }
    }

    fn normalize(
        &self,
        event: &RawEvent,
        tx: &Self::Transaction,
        wallets: &[WalletMatch],
        class: Classification,
    ) -> NormalizedTransactionRecord {
        let t = &tx.transaction;
        let token = if class.tx_type == TxType::TokenTransfer {
            self.token_transfer(tx)
        } else {
            None
        };
        let (token_address, token_amount) = match token {
            Some((addr, amount)) => (Some(addr), Some(amount)),
            None => (None, None),
        };

        NormalizedTransactionRecord {
            chain: ChainFamily::Evm,
            hash: if t.hash.is_empty() { event.id.clone() } else { t.hash.clone() },
            from: normalized(&t.from),
            to: t.to.as_deref().map(normalized),
            wallets: wallets.iter().map(|m| m.wallet.address.to_string()).collect(),
            block_time: None,
            block_number: t
                .block_number
                .or_else(|| tx.receipt.as_ref().and_then(|r| r.block_number)),
            fee: tx.receipt.as_ref().and_then(|r| fee(r, t.gas_price)),
            tx_type: class.tx_type,
            status: class.status,
            value: t.value,
            token_amount,
            token_address,
            raw: tx.raw.clone(),
        }
    }
}
