//! Normalized wallet addresses.
//!
//! Account-based addresses are `0x`-prefixed hex and normalize to lowercase,
//! so `0xABC` and `0xabc` compare equal. Instruction-based addresses are
//! base58-encoded 32-byte public keys and normalize by decoding and
//! re-encoding.

use serde::{Serialize, Serializer};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

use crate::chain::ChainFamily;
use crate::error::AddressError;

const EVM_HEX_LEN: usize = 40;
const SOLANA_KEY_LEN: usize = 32;

/// A validated, normalized address for one chain family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    family: ChainFamily,
    normalized: String,
}

impl Address {
    /// Validate `raw` as an address of `family` and normalize it.
    pub fn parse(family: ChainFamily, raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        let normalized = match family {
            ChainFamily::Evm => normalize_evm(raw)?,
            ChainFamily::Solana => normalize_solana(raw)?,
        };
        Ok(Self { family, normalized })
    }

    /// Infer the family from the address shape and parse it.
    pub fn infer(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if raw.starts_with("0x") || raw.starts_with("0X") {
            return Self::parse(ChainFamily::Evm, raw);
        }
        Self::parse(ChainFamily::Solana, raw)
            .map_err(|_| AddressError::UnknownFamily(raw.to_string()))
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// EIP-55 mixed-case rendering for full-length account-based addresses.
    /// Other addresses are returned in their normalized form.
    pub fn to_checksum(&self) -> String {
        if self.family != ChainFamily::Evm || self.normalized.len() != EVM_HEX_LEN + 2 {
            return self.normalized.clone();
        }
        let hex_part = &self.normalized[2..];
        let mut hasher = Keccak::v256();
        hasher.update(hex_part.as_bytes());
        let mut hash = [0u8; 32];
        hasher.finalize(&mut hash);

        let mut out = String::with_capacity(EVM_HEX_LEN + 2);
        out.push_str("0x");
        for (i, c) in hex_part.chars().enumerate() {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

fn normalize_evm(raw: &str) -> Result<String, AddressError> {
    let invalid = |reason: &str| AddressError::Invalid {
        address: raw.to_string(),
        family: ChainFamily::Evm,
        reason: reason.to_string(),
    };
    let hex_part = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| invalid("missing 0x prefix"))?;
    if hex_part.is_empty() || hex_part.len() > EVM_HEX_LEN {
        return Err(invalid("expected 1 to 40 hex digits"));
    }
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("non-hex character"));
    }
    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}

fn normalize_solana(raw: &str) -> Result<String, AddressError> {
    let invalid = |reason: String| AddressError::Invalid {
        address: raw.to_string(),
        family: ChainFamily::Solana,
        reason,
    };
    let bytes = bs58::decode(raw)
        .into_vec()
        .map_err(|e| invalid(e.to_string()))?;
    if bytes.len() != SOLANA_KEY_LEN {
        return Err(invalid(format!(
            "decoded to {} bytes, expected {SOLANA_KEY_LEN}",
            bytes.len()
        )));
    }
    Ok(bs58::encode(bytes).into_string())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized)
    }
}
