//! walletwatch-core: foundation traits and types for walletwatch.
//!
//! # Overview
//!
//! walletwatch watches blockchain nodes for activity touching a set of
//! tracked wallets and fans matches out to storage and live subscribers.
//! The core crate holds everything that does not talk to the network:
//!
//! - [`RpcTransport`]: the async trait every RPC transport implements
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types
//! - [`WalletRegistry`]: copy-on-write snapshot of tracked wallets
//! - [`TransactionFetcher`]: rate-limited fetch with a fixed retry budget
//! - [`MatchEngine`] + [`ChainAdapter`]: chain-specific matching and classification
//! - [`policy`] module: token bucket limiter and retry policy

pub mod adapter;
pub mod address;
pub mod amount;
pub mod chain;
pub mod error;
pub mod fetcher;
pub mod matcher;
pub mod policy;
pub mod record;
pub mod registry;
pub mod request;
pub mod rules;
pub mod sink;
pub mod transport;
pub mod wallet;

pub use adapter::{ChainAdapter, FollowUp, RawEvent, SubscriptionRequest};
pub use address::Address;
pub use amount::Amount;
pub use chain::ChainFamily;
pub use error::{AddressError, FetchError, TransportError};
pub use fetcher::TransactionFetcher;
pub use matcher::{Classification, MatchEngine, MatchResult, Role, WalletMatch};
pub use record::{NormalizedTransactionRecord, ServerMessage, TransactionPayload, TxStatus, TxType};
pub use registry::{RefreshReport, WalletDirectory, WalletRegistry, WalletSnapshot};
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcId};
pub use rules::RuleTable;
pub use sink::{PersistError, TransactionSink};
pub use transport::RpcTransport;
pub use wallet::{TrackedWallet, WalletEntry};
