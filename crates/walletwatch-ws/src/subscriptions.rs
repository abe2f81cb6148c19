//! Upstream subscription bookkeeping.
//!
//! Each monitored criterion (keyed by [`SubscriptionRequest::key`]) is either
//! waiting for the node to confirm it or active under a node-assigned
//! [`SubscriptionId`]. The subscriber diffs the wanted set against this book
//! before sending anything, and clears the book on disconnect, so the same
//! criterion can never be subscribed twice on one connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use walletwatch_core::adapter::SubscriptionRequest;
use walletwatch_core::request::RpcId;

/// Subscription id assigned by the node (a number on some nodes, a hex
/// string on others).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub RpcId);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum EntryState {
    Pending { request_id: u64 },
    Active { id: SubscriptionId },
}

#[derive(Debug, Clone)]
struct SubscriptionEntry {
    state: EntryState,
}

#[derive(Default)]
struct Book {
    entries: HashMap<String, SubscriptionEntry>,
    /// Outstanding subscribe request id → criterion key.
    pending: HashMap<u64, String>,
    /// Active subscription id → criterion key.
    active: HashMap<SubscriptionId, String>,
    /// Subscribe requests whose criterion was dropped before confirmation.
    orphaned: Vec<u64>,
}

/// What to send to bring the upstream set in line with the wanted set.
#[derive(Debug, Default, PartialEq)]
pub struct SubscriptionDiff {
    pub subscribe: Vec<SubscriptionRequest>,
    /// Confirmed subscriptions to cancel.
    pub unsubscribe: Vec<SubscriptionId>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Result of matching a subscribe response to the book.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The criterion is now active.
    Active(String),
    /// The criterion was dropped while in flight; cancel this id.
    Orphaned(SubscriptionId),
    /// Not a response to any subscribe request we sent.
    Unknown,
}

/// Shared, cloneable view of the subscription book.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    book: Arc<Mutex<Book>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Compute the changes needed to cover exactly `wanted`.
    ///
    /// Entries being cancelled are removed from the book immediately; a
    /// pending one is remembered so its late confirmation gets cancelled.
    pub fn reconcile(&self, wanted: &[SubscriptionRequest]) -> SubscriptionDiff {
        let mut book = self.lock();
        let mut diff = SubscriptionDiff::default();

        let stale: Vec<String> = book
            .entries
            .keys()
            .filter(|k| !wanted.iter().any(|w| &w.key == *k))
            .cloned()
            .collect();
        for key in stale {
            let Some(entry) = book.entries.remove(&key) else {
                continue;
            };
            match entry.state {
                EntryState::Active { id } => {
                    book.active.remove(&id);
                    diff.unsubscribe.push(id);
                }
                EntryState::Pending { request_id } => {
                    book.pending.remove(&request_id);
                    book.orphaned.push(request_id);
                }
            }
        }

        for req in wanted {
            if !book.entries.contains_key(&req.key)
                && !diff.subscribe.iter().any(|s| s.key == req.key)
            {
                diff.subscribe.push(req.clone());
            }
        }
        diff
    }

    /// Record that a subscribe request for `key` went out as `request_id`.
    pub fn mark_pending(&self, key: &str, request_id: u64) {
        let mut book = self.lock();
        book.pending.insert(request_id, key.to_string());
        book.entries.insert(
            key.to_string(),
            SubscriptionEntry {
                state: EntryState::Pending { request_id },
            },
        );
    }

    /// Attach the node-assigned id to the request it answers.
    pub fn confirm(&self, request_id: u64, id: SubscriptionId) -> ConfirmOutcome {
        let mut book = self.lock();
        if let Some(pos) = book.orphaned.iter().position(|r| *r == request_id) {
            book.orphaned.swap_remove(pos);
            return ConfirmOutcome::Orphaned(id);
        }
        let Some(key) = book.pending.remove(&request_id) else {
            return ConfirmOutcome::Unknown;
        };
        book.active.insert(id.clone(), key.clone());
        if let Some(entry) = book.entries.get_mut(&key) {
            entry.state = EntryState::Active { id };
        }
        ConfirmOutcome::Active(key)
    }

    /// Forget a subscribe request the node rejected, so the next
    /// reconciliation retries it. Returns the criterion key.
    pub fn reject(&self, request_id: u64) -> Option<String> {
        let mut book = self.lock();
        book.orphaned.retain(|r| *r != request_id);
        let key = book.pending.remove(&request_id)?;
        book.entries.remove(&key);
        Some(key)
    }

    /// Criterion key of an active subscription.
    pub fn key_for(&self, id: &SubscriptionId) -> Option<String> {
        self.lock().active.get(id).cloned()
    }

    /// Drop everything. Called when the connection goes away, since the
    /// node forgets all subscriptions with it.
    pub fn clear(&self) {
        *self.lock() = Book::default();
    }

    /// Criteria tracked (pending or active).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Criteria confirmed by the node.
    pub fn active_len(&self) -> usize {
        self.lock().active.len()
    }
}
