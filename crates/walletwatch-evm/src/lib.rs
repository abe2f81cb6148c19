//! # walletwatch-evm
//!
//! Account-based chain adapter.
//!
//! ## Pipeline notes
//! - One `eth_subscribe ["newPendingTransactions"]` feed per connection;
//!   each notification is a bare transaction hash
//! - `eth_getTransactionByHash`, then `eth_getTransactionReceipt` once the
//!   transaction is mined, for status, fee and logs
//! - A wallet matches when it is the sender or the recipient
//! - `Transfer(address,address,uint256)` logs or ERC-20 transfer selectors
//!   mark a token transfer; swap and initializer selectors come from the
//!   [`walletwatch_core::RuleTable`]

pub mod adapter;
pub mod signature;
pub mod types;

pub use adapter::EvmAdapter;
pub use types::{EvmLog, EvmReceipt, EvmTransaction, ResolvedEvmTransaction};
