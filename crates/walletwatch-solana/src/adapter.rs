//! [`ChainAdapter`] for instruction-based chains.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde_json::{json, Value};

use walletwatch_core::adapter::{ChainAdapter, RawEvent, SubscriptionRequest};
use walletwatch_core::amount::Amount;
use walletwatch_core::chain::ChainFamily;
use walletwatch_core::error::TransportError;
use walletwatch_core::matcher::{Classification, Role, WalletMatch};
use walletwatch_core::record::{NormalizedTransactionRecord, TxStatus, TxType};
use walletwatch_core::registry::WalletSnapshot;
use walletwatch_core::rules::RuleTable;
use walletwatch_core::transport::{call_optional, RpcTransport};

use crate::programs::{self, SYSTEM_PROGRAM};
use crate::types::{ResolvedSolanaTransaction, SolanaTransaction};

const COMMITMENT: &str = "confirmed";

pub struct SolanaAdapter {
    rules: RuleTable,
}

impl SolanaAdapter {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }
}

impl Default for SolanaAdapter {
    fn default() -> Self {
        Self::new(programs::default_rules())
    }
}

fn abs_diff(a: Amount, b: Amount) -> Amount {
    if a >= b {
        Amount(a.0 - b.0)
    } else {
        Amount(b.0 - a.0)
    }
}

/// First (account index, mint) whose raw token balance changed, in key
/// order, with the absolute change.
fn token_delta(tx: &SolanaTransaction) -> Option<(String, Amount)> {
    let meta = tx.meta.as_ref()?;
    let mut balances: BTreeMap<(usize, &str), (Amount, Amount)> = BTreeMap::new();
    for b in &meta.pre_token_balances {
        balances.entry((b.account_index, b.mint.as_str())).or_default().0 = b.raw_amount();
    }
    for b in &meta.post_token_balances {
        balances.entry((b.account_index, b.mint.as_str())).or_default().1 = b.raw_amount();
    }
    balances
        .into_iter()
        .find(|(_, (pre, post))| pre != post)
        .map(|((_, mint), (pre, post))| (mint.to_string(), abs_diff(pre, post)))
}

/// Lamports credited to the second key, the recipient of a plain transfer.
fn lamports_received(tx: &SolanaTransaction) -> Option<Amount> {
    let meta = tx.meta.as_ref()?;
    let pre = *meta.pre_balances.get(1)?;
    let post = *meta.post_balances.get(1)?;
    (post > pre).then(|| Amount::from_u64(post - pre))
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    type Transaction = ResolvedSolanaTransaction;

    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    /// One `logsSubscribe` per tracked wallet, keyed by its address.
    fn subscriptions(&self, snapshot: &WalletSnapshot) -> Vec<SubscriptionRequest> {
        snapshot
            .wallets()
            .iter()
            .map(|w| SubscriptionRequest {
                key: w.address.to_string(),
                method: "logsSubscribe".to_string(),
                params: vec![
                    json!({ "mentions": [w.address.as_str()] }),
                    json!({ "commitment": COMMITMENT }),
                ],
            })
            .collect()
    }

    fn unsubscribe_method(&self) -> &'static str {
        "logsUnsubscribe"
    }

    fn parse_event(&self, result: &Value) -> Option<RawEvent> {
        result
            .get("value")?
            .get("signature")?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(RawEvent::new)
    }

    async fn resolve_transaction(
        &self,
        transport: &dyn RpcTransport,
        event: &RawEvent,
    ) -> Result<Option<Self::Transaction>, TransportError> {
        let params = vec![
            json!(event.id),
            json!({
                "encoding": "json",
                "commitment": COMMITMENT,
                "maxSupportedTransactionVersion": 0
            }),
        ];
        let raw: Option<Value> = call_optional(transport, 1, "getTransaction", params).await?;
        if raw.is_none() {
            tracing::trace!(signature = %event.id, "transaction not indexed yet");
        }
        raw.map(ResolvedSolanaTransaction::from_raw)
            .transpose()
            .map_err(TransportError::Deserialization)
    }

    /// Lookups lag the node's indexing; a `null` result is worth retrying.
    fn retry_on_missing(&self) -> bool {
        true
    }

    fn match_wallets(&self, tx: &Self::Transaction, snapshot: &WalletSnapshot) -> Vec<WalletMatch> {
        let t = &tx.transaction;
        let keys = t.participant_keys();
        let referenced: HashSet<usize> = t
            .transaction
            .message
            .instructions
            .iter()
            .flat_map(|ix| ix.accounts.iter().copied())
            .collect();

        let mut matches = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let Some(wallet) = snapshot.lookup_raw(key) else {
                continue;
            };
            let role = if i == 0 { Role::Signer } else { Role::Participant };
            matches.push(WalletMatch {
                wallet: wallet.clone(),
                role,
            });
        }
        // Instruction references resolve into the same key list; anything
        // pointing past it is malformed and ignored.
        for i in referenced {
            if let Some(wallet) = keys.get(i).and_then(|k| snapshot.lookup_raw(k)) {
                if !matches.iter().any(|m| m.wallet == *wallet) {
                    matches.push(WalletMatch {
                        wallet: wallet.clone(),
                        role: Role::Participant,
                    });
                }
            }
        }
        matches
    }

    fn classify(&self, tx: &Self::Transaction) -> Classification {
        let t = &tx.transaction;
        let status = match &t.meta {
            None => TxStatus::Pending,
            Some(meta) if meta.err.is_some() => TxStatus::Failed,
            Some(_) => TxStatus::Success,
        };

        if token_delta(t).is_some() {
            return Classification {
                tx_type: TxType::TokenTransfer,
                status,
            };
        }

        let programs = t.invoked_programs();
        let candidates = programs
            .iter()
            .copied()
            .chain(t.log_messages().iter().map(String::as_str));
        let tx_type = self.rules.classify(candidates).unwrap_or_else(|| {
            if programs.contains(&SYSTEM_PROGRAM) {
                TxType::Transfer
            } else if !programs.is_empty() {
                TxType::ContractCall
            } else {
                TxType::Other
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
        let keys = t.participant_keys();
        let (token_address, token_amount) = match token_delta(t) {
            Some((mint, amount)) => (Some(mint), Some(amount)),
            None => (None, None),
        };
        let value = match class.tx_type {
            TxType::Transfer => lamports_received(t),
            _ => None,
        };

        NormalizedTransactionRecord {
            chain: ChainFamily::Solana,
            hash: t.signature().unwrap_or(&event.id).to_string(),
            from: keys.first().map(|k| k.to_string()).unwrap_or_default(),
            to: keys.get(1).map(|k| k.to_string()),
            wallets: wallets.iter().map(|m| m.wallet.address.to_string()).collect(),
            block_time: t.block_time.map(Amount::from_u64),
            block_number: t.slot.map(Amount::from_u64),
            fee: t.meta.as_ref().and_then(|m| m.fee).map(Amount::from_u64),
            tx_type: class.tx_type,
            status: class.status,
            value,
            token_amount,
            token_address,
            raw: tx.raw.clone(),
        }
    }

    fn logs(&self, tx: &Self::Transaction) -> Vec<String> {
        tx.transaction.log_messages().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletwatch_core::address::Address;
    use walletwatch_core::wallet::TrackedWallet;

    const W1: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const W2: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const W3: &str = "So11111111111111111111111111111111111111112";

    fn snapshot(addrs: &[&str]) -> WalletSnapshot {
        WalletSnapshot::new(
            ChainFamily::Solana,
            addrs
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    TrackedWallet::new(Address::parse(ChainFamily::Solana, a).unwrap(), format!("W{}", i + 1))
                })
                .collect(),
        )
    }

    fn resolved(raw: Value) -> ResolvedSolanaTransaction {
        ResolvedSolanaTransaction::from_raw(raw).unwrap()
    }

    fn transfer(meta: Value) -> ResolvedSolanaTransaction {
        resolved(json!({
            "slot": 42,
            "blockTime": 1700000000,
            "transaction": {
                "signatures": ["5sig"],
                "message": {
                    "accountKeys": [W1, W2, SYSTEM_PROGRAM],
                    "instructions": [{ "programIdIndex": 2, "accounts": [0, 1], "data": "3Bxs4h24hBtQy9rw" }]
                }
            },
            "meta": meta
        }))
    }

    #[test]
    fn signer_and_participant_roles() {
        let a = SolanaAdapter::default();
        let tx = transfer(json!({ "err": null, "fee": 5000 }));
        let matches = a.match_wallets(&tx, &snapshot(&[W1, W2]));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].role, Role::Signer);
        assert_eq!(matches[0].wallet.address.as_str(), W1);
        assert_eq!(matches[1].role, Role::Participant);
    }

    #[test]
    fn wallet_referenced_only_through_lookup_table() {
        let a = SolanaAdapter::default();
        let tx = resolved(json!({
            "transaction": {
                "message": {
                    "accountKeys": [W1, SYSTEM_PROGRAM],
                    "instructions": [{ "programIdIndex": 1, "accounts": [0, 2] }]
                }
            },
            "meta": { "err": null, "loadedAddresses": { "writable": [W3], "readonly": [] } }
        }));
        let matches = a.match_wallets(&tx, &snapshot(&[W3]));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].role, Role::Participant);
    }

    #[test]
    fn out_of_range_instruction_index_is_ignored() {
        let a = SolanaAdapter::default();
        let tx = resolved(json!({
            "transaction": {
                "message": {
                    "accountKeys": [W1],
                    "instructions": [{ "programIdIndex": 0, "accounts": [7] }]
                }
            }
        }));
        assert!(a.match_wallets(&tx, &snapshot(&[W2])).is_empty());
    }

    #[test]
    fn system_transfer_record() {
        let a = SolanaAdapter::default();
        let tx = transfer(json!({
            "err": null,
            "fee": 5000,
            "preBalances": [10_000_000, 0, 1],
            "postBalances": [8_995_000, 1_000_000, 1],
            "logMessages": ["Program 11111111111111111111111111111111 invoke [1]"]
        }));
        let class = a.classify(&tx);
        assert_eq!(
            class,
            Classification {
                tx_type: TxType::Transfer,
                status: TxStatus::Success
            }
        );

        let wallets = a.match_wallets(&tx, &snapshot(&[W1]));
        let rec = a.normalize(&RawEvent::new("5sig"), &tx, &wallets, class);
        assert_eq!(rec.hash, "5sig");
        assert_eq!(rec.from, W1);
        assert_eq!(rec.to.as_deref(), Some(W2));
        assert_eq!(rec.fee, Some(Amount::from_u64(5000)));
        assert_eq!(rec.block_number, Some(Amount::from_u64(42)));
        assert_eq!(rec.block_time, Some(Amount::from_u64(1_700_000_000)));
        assert_eq!(rec.value, Some(Amount::from_u64(1_000_000)));
        assert_eq!(rec.wallets, vec![W1.to_string()]);
        assert_eq!(a.logs(&tx).len(), 1);
    }

    #[test]
    fn token_delta_wins_and_fills_token_fields() {
        let a = SolanaAdapter::default();
        let balance = |idx: usize, amount: &str| {
            json!({
                "accountIndex": idx,
                "mint": W2,
                "uiTokenAmount": { "amount": amount, "decimals": 6 }
            })
        };
        let tx = transfer(json!({
            "err": null,
            "preTokenBalances": [balance(0, "5000000"), balance(1, "0")],
            "postTokenBalances": [balance(0, "3000000"), balance(1, "2000000")],
            "logMessages": ["Program log: Instruction: Swap"]
        }));
        let class = a.classify(&tx);
        assert_eq!(class.tx_type, TxType::TokenTransfer);

        let rec = a.normalize(&RawEvent::new("5sig"), &tx, &[], class);
        assert_eq!(rec.token_address.as_deref(), Some(W2));
        assert_eq!(rec.token_amount, Some(Amount::from_u64(2_000_000)));
        assert!(rec.value.is_none());
    }

    #[test]
    fn swap_program_without_balance_change() {
        let a = SolanaAdapter::default();
        let tx = resolved(json!({
            "transaction": {
                "message": {
                    "accountKeys": [W1, programs::JUPITER_V6],
                    "instructions": [{ "programIdIndex": 1, "accounts": [0] }]
                }
            },
            "meta": { "err": { "InstructionError": [0, { "Custom": 6001 }] } }
        }));
        assert_eq!(
            a.classify(&tx),
            Classification {
                tx_type: TxType::Swap,
                status: TxStatus::Failed
            }
        );
    }

    #[test]
    fn unknown_program_is_contract_call_and_no_meta_is_pending() {
        let a = SolanaAdapter::default();
        let tx = resolved(json!({
            "transaction": {
                "message": {
                    "accountKeys": [W1, W3],
                    "instructions": [{ "programIdIndex": 1, "accounts": [0] }]
                }
            }
        }));
        assert_eq!(
            a.classify(&tx),
            Classification {
                tx_type: TxType::ContractCall,
                status: TxStatus::Pending
            }
        );
    }

    #[test]
    fn mentions_subscription_per_wallet() {
        let a = SolanaAdapter::default();
        let subs = a.subscriptions(&snapshot(&[W1, W2]));
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].key, W1);
        assert_eq!(subs[0].method, "logsSubscribe");
        assert_eq!(subs[0].params[0], json!({ "mentions": [W1] }));
        assert_eq!(subs[0].params[1], json!({ "commitment": "confirmed" }));
    }

    #[test]
    fn notification_signature() {
        let a = SolanaAdapter::default();
        let result = json!({ "context": { "slot": 1 }, "value": { "signature": "5sig", "err": null, "logs": [] } });
        assert_eq!(a.parse_event(&result), Some(RawEvent::new("5sig")));
        assert!(a.parse_event(&json!({ "value": {} })).is_none());
    }
}
