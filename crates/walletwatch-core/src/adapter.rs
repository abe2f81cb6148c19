//! The seam between the shared pipeline and a specific ledger model.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::chain::ChainFamily;
use crate::error::TransportError;
use crate::matcher::{Classification, WalletMatch};
use crate::record::NormalizedTransactionRecord;
use crate::registry::WalletSnapshot;
use crate::transport::RpcTransport;

/// Identifier carried by one upstream notification (a transaction hash or
/// signature). Consumed once by the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawEvent {
    pub id: String,
}

impl RawEvent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One upstream subscription the subscriber must hold open.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    /// Stable identity of the monitored criterion. Used to diff the wanted
    /// set against the live set so the same criterion is never subscribed
    /// twice.
    pub key: String,
    pub method: String,
    pub params: Vec<Value>,
}

/// A second JSON-RPC call a resolved transaction still needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    pub method: &'static str,
    pub params: Vec<Value>,
}

/// Everything chain-specific about a pipeline.
///
/// `match_wallets`, `classify` and `normalize` must be pure: the match
/// engine calls them without any I/O so the rules can be tested on
/// fixtures alone.
#[async_trait]
pub trait ChainAdapter: Send + Sync + 'static {
    /// The resolved transaction as the node returns it.
    type Transaction: Serialize + Send + Sync + 'static;

    fn family(&self) -> ChainFamily;

    /// Subscriptions required to cover `snapshot`.
    fn subscriptions(&self, snapshot: &WalletSnapshot) -> Vec<SubscriptionRequest>;

    /// Method used to cancel a subscription id returned by the node.
    fn unsubscribe_method(&self) -> &'static str;

    /// Extract the event from a notification's `params.result`.
    fn parse_event(&self, result: &Value) -> Option<RawEvent>;

    /// One attempt at resolving `event`. `Ok(None)` means the node does not
    /// know the transaction yet.
    async fn resolve_transaction(
        &self,
        transport: &dyn RpcTransport,
        event: &RawEvent,
    ) -> Result<Option<Self::Transaction>, TransportError>;

    /// Should a `null` lookup be retried within the fetch budget?
    fn retry_on_missing(&self) -> bool {
        false
    }

    /// Extra lookup `tx` needs before it can be classified. It is issued as
    /// its own fetch, so it takes its own limiter token.
    fn follow_up(&self, _tx: &Self::Transaction) -> Option<FollowUp> {
        None
    }

    /// Fold the result of [`ChainAdapter::follow_up`] into `tx`.
    fn apply_follow_up(
        &self,
        _tx: &mut Self::Transaction,
        _result: Value,
    ) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn match_wallets(&self, tx: &Self::Transaction, snapshot: &WalletSnapshot) -> Vec<WalletMatch>;

    fn classify(&self, tx: &Self::Transaction) -> Classification;

    fn normalize(
        &self,
        event: &RawEvent,
        tx: &Self::Transaction,
        wallets: &[WalletMatch],
        class: Classification,
    ) -> NormalizedTransactionRecord;

    /// Program/execution log lines forwarded with the broadcast.
    fn logs(&self, _tx: &Self::Transaction) -> Vec<String> {
        Vec::new()
    }
}
