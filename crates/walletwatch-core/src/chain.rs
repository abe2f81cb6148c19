//! Chain family identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ledger model a pipeline instance watches.
///
/// Serialized as the directory service spells it (`"EVM"` / `"SOL"`);
/// parsing is case-insensitive and accepts a few common aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ChainFamily {
    /// Account-based ledger with explicit sender/receiver fields.
    #[serde(rename = "EVM")]
    Evm,
    /// Instruction-based ledger: participant keys plus indexed instructions.
    #[serde(rename = "SOL")]
    Solana,
}

impl ChainFamily {
    /// Short tag used in env-var prefixes and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "EVM",
            ChainFamily::Solana => "SOL",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EVM" | "ETH" | "BSC" | "ACCOUNT_BASED" => Ok(ChainFamily::Evm),
            "SOL" | "SOLANA" | "INSTRUCTION_BASED" => Ok(ChainFamily::Solana),
            other => Err(format!("unknown chain family `{other}`")),
        }
    }
}

impl TryFrom<String> for ChainFamily {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
