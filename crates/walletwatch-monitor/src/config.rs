//! Pipeline configuration from `.env` and process variables.
//!
//! Each pipeline reads its own prefix (`EVM_…`, `SOL_…`) plus the shared
//! `DIRECTORY_BASE_URL`. Only the upstream credentials are mandatory.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use walletwatch_core::chain::ChainFamily;
use walletwatch_core::policy::{Backoff, RateLimiterConfig, RetryConfig};
use walletwatch_core::rules::{RuleTable, RulesError};

pub const DEFAULT_DIRECTORY_URL: &str = "http://localhost:3000";
pub const DEFAULT_SOL_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const HELIUS_WS_URL: &str = "wss://mainnet.helius-rpc.com/?api-key=";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {key}")]
    MissingVar { key: String },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error(transparent)]
    Rules(#[from] RulesError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub family: ChainFamily,
    /// Upstream subscription endpoint.
    pub ws_url: String,
    /// Upstream endpoint for transaction lookups.
    pub rpc_url: String,
    /// Base of the wallet directory and persistence API.
    pub directory_url: String,
    /// Client-facing live-update server.
    pub listen_addr: SocketAddr,
    pub rate_limit: RateLimiterConfig,
    pub refresh_interval: Duration,
    pub keepalive: Duration,
    pub retry: RetryConfig,
    pub reconnect: Backoff,
    pub http_timeout: Duration,
    pub rules_file: Option<PathBuf>,
    /// Events resolved concurrently before the pipeline stops reading more.
    pub max_in_flight: usize,
}

/// Variable prefix of a pipeline.
pub fn prefix(family: ChainFamily) -> &'static str {
    match family {
        ChainFamily::Evm => "EVM",
        ChainFamily::Solana => "SOL",
    }
}

/// Load `.env` if present. A missing file is fine.
pub fn hydrate_env_file() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err)),
    }
}

struct Vars<F> {
    lookup: F,
    prefix: &'static str,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingVar {
            key: key.to_string(),
        })
    }

    fn scoped(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("{raw:?}: {e}"),
            }),
        }
    }

    fn scoped_parsed<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parsed(&self.scoped(name), default)
    }

    /// A scoped count or period where zero would stall or panic later.
    fn scoped_nonzero<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
        T::Err: std::fmt::Display,
    {
        let value = self.scoped_parsed(name, default)?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                key: self.scoped(name),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(value)
    }
}

/// `ws://` → `http://`, `wss://` → `https://`.
fn http_from_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

impl PipelineConfig {
    /// Hydrate `.env`, then read the process environment.
    pub fn from_env(family: ChainFamily) -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Self::from_lookup(family, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(family: ChainFamily, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars {
            lookup,
            prefix: prefix(family),
        };

        let (ws_url, rpc_url, default_port, rate_limit) = match family {
            ChainFamily::Evm => {
                let ws_url = vars
                    .optional("EVM_WS_URL")
                    .or_else(|| vars.optional("BSC_NODE_URL"))
                    .ok_or_else(|| ConfigError::MissingVar {
                        key: "EVM_WS_URL".to_string(),
                    })?;
                let rpc_url = vars
                    .optional("EVM_RPC_URL")
                    .unwrap_or_else(|| http_from_ws(&ws_url));
                let rate = RateLimiterConfig::per_second(
                    vars.scoped_parsed("RATE_LIMIT_CAPACITY", 50)?,
                    vars.scoped_parsed("RATE_LIMIT_PER_SEC", 50)?,
                );
                (ws_url, rpc_url, 8081, rate)
            }
            ChainFamily::Solana => {
                let api_key = vars.required("HELIUS_API_KEY")?;
                let ws_url = vars
                    .optional("SOL_WS_URL")
                    .unwrap_or_else(|| format!("{HELIUS_WS_URL}{api_key}"));
                let rpc_url = vars
                    .optional("SOL_RPC_URL")
                    .unwrap_or_else(|| DEFAULT_SOL_RPC_URL.to_string());
                let rate = RateLimiterConfig::window(
                    vars.scoped_parsed("RATE_LIMIT_CAPACITY", 20)?,
                    Duration::from_secs(vars.scoped_parsed("RATE_LIMIT_WINDOW_SECS", 60)?),
                );
                (ws_url, rpc_url, 8080, rate)
            }
        };

        let listen_addr =
            vars.scoped_parsed("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], default_port)))?;

        let retry = RetryConfig {
            max_attempts: vars.scoped_nonzero("FETCH_ATTEMPTS", 3)?,
            delay: Duration::from_millis(vars.scoped_parsed("FETCH_RETRY_DELAY_MS", 2000)?),
            attempt_timeout: Duration::from_secs(vars.scoped_parsed("FETCH_TIMEOUT_SECS", 15)?),
        };

        let reconnect = Backoff {
            max_attempts: vars.scoped_parsed("MAX_RECONNECTS", 5)?,
            ..Backoff::default()
        };

        Ok(Self {
            family,
            ws_url,
            rpc_url,
            directory_url: vars
                .optional("DIRECTORY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string()),
            listen_addr,
            rate_limit,
            refresh_interval: Duration::from_secs(vars.scoped_nonzero("REFRESH_INTERVAL_SECS", 60)?),
            keepalive: Duration::from_secs(vars.scoped_nonzero("KEEPALIVE_SECS", 30)?),
            retry,
            reconnect,
            http_timeout: Duration::from_secs(30),
            rules_file: vars.optional(&vars.scoped("RULES_FILE")).map(PathBuf::from),
            max_in_flight: vars.scoped_nonzero("MAX_IN_FLIGHT", 256)?,
        })
    }

    /// Built-in rules for this family, overlaid with the rules file if one
    /// is configured.
    pub fn rules(&self, defaults: RuleTable) -> Result<RuleTable, ConfigError> {
        match &self.rules_file {
            None => Ok(defaults),
            Some(path) => Ok(defaults.overlay(RuleTable::load(path)?)),
        }
    }
}
