//! Tracked-wallet registry.
//!
//! The registry holds an immutable [`WalletSnapshot`] behind a
//! `tokio::sync::watch` channel. A refresh builds a complete new snapshot
//! and swaps it in with one send, so a reader either sees the old set or
//! the new one, never a mix. Receivers of [`WalletRegistry::subscribe`] are
//! woken on every change.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::address::Address;
use crate::chain::ChainFamily;
use crate::error::TransportError;
use crate::wallet::{TrackedWallet, WalletEntry};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Immutable set of tracked wallets for one chain family.
#[derive(Debug, Clone)]
pub struct WalletSnapshot {
    family: ChainFamily,
    wallets: Vec<TrackedWallet>,
    index: HashMap<Address, usize>,
}

impl WalletSnapshot {
    /// Build a snapshot. Duplicate addresses keep their first entry.
    pub fn new(family: ChainFamily, wallets: Vec<TrackedWallet>) -> Self {
        let mut kept = Vec::with_capacity(wallets.len());
        let mut index = HashMap::with_capacity(wallets.len());
        for w in wallets {
            if index.contains_key(&w.address) {
                continue;
            }
            index.insert(w.address.clone(), kept.len());
            kept.push(w);
        }
        Self {
            family,
            wallets: kept,
            index,
        }
    }

    pub fn empty(family: ChainFamily) -> Self {
        Self::new(family, Vec::new())
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }

    pub fn wallets(&self) -> &[TrackedWallet] {
        &self.wallets
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&TrackedWallet> {
        self.index.get(address).map(|&i| &self.wallets[i])
    }

    /// Look up an address as it appears on chain; it is normalized first.
    pub fn lookup_raw(&self, raw: &str) -> Option<&TrackedWallet> {
        let address = Address::parse(self.family, raw).ok()?;
        self.get(&address)
    }
}

// ─── Directory ───────────────────────────────────────────────────────────────

/// Source of the authoritative wallet list.
#[async_trait]
pub trait WalletDirectory: Send + Sync {
    async fn fetch_wallets(&self) -> Result<Vec<WalletEntry>, TransportError>;
}

/// What a refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub accepted: usize,
    pub invalid: usize,
    pub other_chain: usize,
    /// Whether the published snapshot differs from the previous one.
    pub changed: bool,
    /// Every entry for this chain was malformed, so the previous snapshot
    /// was left in place.
    pub kept_previous: bool,
    /// Addresses published by this refresh that the previous snapshot
    /// did not track.
    pub added: Vec<Address>,
}

// ─── Registry ────────────────────────────────────────────────────────────────

pub struct WalletRegistry {
    family: ChainFamily,
    tx: watch::Sender<Arc<WalletSnapshot>>,
}

impl WalletRegistry {
    pub fn new(family: ChainFamily) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(WalletSnapshot::empty(family)));
        Self { family, tx }
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }

    /// The latest published snapshot.
    pub fn current(&self) -> Arc<WalletSnapshot> {
        self.tx.borrow().clone()
    }

    /// Change notifications; the receiver starts at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WalletSnapshot>> {
        self.tx.subscribe()
    }

    /// Pull the directory and publish the result. On error the previous
    /// snapshot stays in effect.
    pub async fn refresh(
        &self,
        directory: &dyn WalletDirectory,
    ) -> Result<RefreshReport, TransportError> {
        let entries = directory.fetch_wallets().await?;
        Ok(self.apply(entries))
    }

    /// Filter, normalize and publish `entries` as the new wallet set.
    /// Malformed entries are dropped with a warning.
    pub fn apply(&self, entries: Vec<WalletEntry>) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut wallets = Vec::with_capacity(entries.len());

        for entry in &entries {
            match entry.resolve(self.family) {
                Ok(Some(w)) => wallets.push(w),
                Ok(None) => report.other_chain += 1,
                Err(e) => {
                    report.invalid += 1;
                    tracing::warn!(
                        chain = %self.family,
                        label = %entry.label,
                        error = %e,
                        "dropping invalid wallet entry"
                    );
                }
            }
        }

        if wallets.is_empty() && report.invalid > 0 {
            report.kept_previous = true;
            tracing::warn!(
                chain = %self.family,
                invalid = report.invalid,
                "no valid wallet entries, keeping previous set"
            );
            return report;
        }

        let next = WalletSnapshot::new(self.family, wallets);
        report.accepted = next.len();
        let next = Arc::new(next);

        let mut added = Vec::new();
        report.changed = self.tx.send_if_modified(|cur| {
            if cur.wallets == next.wallets {
                return false;
            }
            added = next
                .wallets
                .iter()
                .filter(|w| !cur.wallets.iter().any(|c| c.address == w.address))
                .cloned()
                .collect();
            *cur = next.clone();
            true
        });

        for wallet in &added {
            tracing::info!(
                chain = %self.family,
                label = %wallet.label,
                address = %wallet.address.to_checksum(),
                "tracking wallet"
            );
        }
        report.added = added.into_iter().map(|w| w.address).collect();

        tracing::debug!(
            chain = %self.family,
            accepted = report.accepted,
            invalid = report.invalid,
            changed = report.changed,
            "wallet registry refreshed"
        );
        report
    }
}
