//! Match engine: decides whether a resolved transaction concerns a tracked
//! wallet and produces the normalized record for it.

use serde::Serialize;
use std::sync::Arc;

use crate::adapter::{ChainAdapter, RawEvent};
use crate::record::{NormalizedTransactionRecord, ServerMessage, TransactionPayload, TxStatus, TxType};
use crate::registry::WalletSnapshot;
use crate::wallet::TrackedWallet;

/// How a matched wallet takes part in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Participant,
    Signer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletMatch {
    pub wallet: TrackedWallet,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub tx_type: TxType,
    pub status: TxStatus,
}

/// A transaction that touched at least one tracked wallet.
#[derive(Debug, Clone)]
pub struct MatchResult<T> {
    pub transaction: T,
    pub wallets: Vec<WalletMatch>,
    pub record: NormalizedTransactionRecord,
    pub logs: Vec<String>,
}

impl<T> MatchResult<T> {
    /// Strongest role held by any matched wallet.
    pub fn role(&self) -> Role {
        self.wallets
            .iter()
            .map(|m| m.role)
            .max()
            .unwrap_or(Role::Participant)
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Transaction(Box::new(TransactionPayload {
            hash: self.record.hash.clone(),
            transaction: self.record.clone(),
            wallets: self.wallets.clone(),
            logs: self.logs.clone(),
        }))
    }
}

/// Applies an adapter's pure rules to a resolved transaction.
pub struct MatchEngine<A: ChainAdapter> {
    adapter: Arc<A>,
}

impl<A: ChainAdapter> Clone for MatchEngine<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
        }
    }
}

impl<A: ChainAdapter> MatchEngine<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// `None` when no tracked wallet is involved. Otherwise the result holds
    /// at least one wallet, each listed once.
    pub fn evaluate(
        &self,
        event: &RawEvent,
        tx: A::Transaction,
        snapshot: &WalletSnapshot,
    ) -> Option<MatchResult<A::Transaction>> {
        let mut wallets = self.adapter.match_wallets(&tx, snapshot);
        dedup_strongest(&mut wallets);
        if wallets.is_empty() {
            return None;
        }

        let class = self.adapter.classify(&tx);
        let record = self.adapter.normalize(event, &tx, &wallets, class);
        let logs = self.adapter.logs(&tx);

        Some(MatchResult {
            transaction: tx,
            wallets,
            record,
            logs,
        })
    }
}

/// Collapse duplicate wallets, keeping the strongest role, in first-seen order.
fn dedup_strongest(wallets: &mut Vec<WalletMatch>) {
    let mut out: Vec<WalletMatch> = Vec::with_capacity(wallets.len());
    for m in wallets.drain(..) {
        match out.iter_mut().find(|o| o.wallet.address == m.wallet.address) {
            Some(existing) => existing.role = existing.role.max(m.role),
            None => out.push(m),
        }
    }
    *wallets = out;
}
