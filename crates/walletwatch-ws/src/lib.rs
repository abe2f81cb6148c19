//! walletwatch-ws: WebSocket plumbing.
//!
//! # Features
//! - [`ChainSubscriber`]: one upstream pub/sub connection per pipeline with
//!   keepalive pings, rate-limited subscription setup, live resubscription
//!   when the wallet set changes and bounded reconnect-with-backoff
//! - [`SubscriptionManager`]: bookkeeping that keeps the upstream
//!   subscription set free of duplicates across reconnects
//! - [`Broadcaster`]: client-facing server that greets every client with the
//!   wallet snapshot and fans out match events without blocking ingestion

pub mod server;
pub mod subscriber;
pub mod subscriptions;

pub use server::{BroadcastError, Broadcaster, BroadcasterConfig, ClientId};
pub use subscriber::{
    classify_frame, redact, ChainSubscriber, Frame, SubscriberConfig, SubscriptionError,
};
pub use subscriptions::{ConfirmOutcome, SubscriptionDiff, SubscriptionId, SubscriptionManager};
