//! Wallet directory client.

use async_trait::async_trait;
use std::time::Duration;

use walletwatch_core::error::TransportError;
use walletwatch_core::registry::WalletDirectory;
use walletwatch_core::wallet::WalletEntry;

use crate::client::build_http;

const TRACKED_WALLETS_PATH: &str = "/api/tracked-wallets";

/// Reads the authoritative tracked-wallet list from the directory service.
pub struct DirectoryClient {
    url: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    /// `base_url` is the service root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            url: format!("{}{TRACKED_WALLETS_PATH}", base_url.trim_end_matches('/')),
            http: build_http(timeout)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WalletDirectory for DirectoryClient {
    async fn fetch_wallets(&self) -> Result<Vec<WalletEntry>, TransportError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(TransportError::Http(format!(
                "directory returned HTTP {status}"
            )));
        }

        let entries = resp
            .json::<Vec<WalletEntry>>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        tracing::debug!(count = entries.len(), url = %self.url, "fetched tracked wallets");
        Ok(entries)
    }
}
