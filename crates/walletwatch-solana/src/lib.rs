//! walletwatch-solana: instruction-based chain adapter.
//!
//! Subscribes to `logsSubscribe { mentions: [wallet] }` once per tracked
//! wallet, resolves each notified signature with `getTransaction` and
//! matches wallets against the full participant-key list, including keys
//! loaded through address lookup tables.
//!
//! Classification order:
//! 1. any pre/post token balance delta is a `TOKEN_TRANSFER`
//! 2. the [`RuleTable`](walletwatch_core::RuleTable) markers, checked
//!    against invoked program ids and log lines
//! 3. a system-program instruction is a `TRANSFER`, any other instruction a
//!    `CONTRACT_CALL`

pub mod adapter;
pub mod programs;
pub mod types;

pub use adapter::SolanaAdapter;
pub use types::{ResolvedSolanaTransaction, SolanaTransaction, TransactionMeta};
