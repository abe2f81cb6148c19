//! Classification marker table.
//!
//! Program ids, function selectors and log markers that identify token
//! transfers, swaps and initializations differ per deployment, so they live
//! in data rather than in code. Each chain adapter ships defaults; a JSON
//! file can replace any of the three lists.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::record::TxType;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("cannot read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rule file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub token_transfer: Vec<String>,
    #[serde(default)]
    pub swap: Vec<String>,
    #[serde(default)]
    pub initialize: Vec<String>,
}

impl RuleTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RulesError::Parse {
            path: display,
            source,
        })
    }

    /// Replace each list of `self` that `overrides` provides a non-empty
    /// version of.
    pub fn overlay(mut self, overrides: RuleTable) -> Self {
        if !overrides.token_transfer.is_empty() {
            self.token_transfer = overrides.token_transfer;
        }
        if !overrides.swap.is_empty() {
            self.swap = overrides.swap;
        }
        if !overrides.initialize.is_empty() {
            self.initialize = overrides.initialize;
        }
        self
    }

    /// First rule (in token-transfer, swap, initialize order) that any of
    /// `candidates` matches. A candidate matches a marker when it contains
    /// it, so a marker can be a full program id or a fragment of a log line.
    pub fn classify<'a, I>(&self, candidates: I) -> Option<TxType>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let candidates: Vec<&str> = candidates.into_iter().collect();
        let hit = |markers: &[String]| {
            markers
                .iter()
                .any(|m| !m.is_empty() && candidates.iter().any(|c| c.contains(m.as_str())))
        };
        if hit(&self.token_transfer) {
            Some(TxType::TokenTransfer)
        } else if hit(&self.swap) {
            Some(TxType::Swap)
        } else if hit(&self.initialize) {
            Some(TxType::Initialize)
        } else {
            None
        }
    }
}
