//! walletwatch-http: reqwest-backed clients.
//!
//! - [`HttpRpcClient`]: JSON-RPC over HTTP, used to resolve transactions
//! - [`DirectoryClient`]: `GET /api/tracked-wallets`
//! - [`HttpPersister`]: `POST /api/transactions`

pub mod client;
pub mod directory;
pub mod persister;

pub use client::{HttpClientConfig, HttpRpcClient};
pub use directory::DirectoryClient;
pub use persister::HttpPersister;
