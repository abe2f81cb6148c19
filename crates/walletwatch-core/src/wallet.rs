//! Tracked wallet model.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::chain::ChainFamily;
use crate::error::AddressError;

/// One entry as served by the wallet directory (`GET /api/tracked-wallets`).
///
/// Fields are kept loose on purpose: the directory may omit `chain`, send a
/// family this process does not recognise, or carry garbage addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub address: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub chain: Option<String>,
}

impl WalletEntry {
    pub fn new(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
            chain: None,
        }
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    /// Resolve this entry for a pipeline watching `family`.
    ///
    /// - `Ok(None)`: the entry belongs to another chain family.
    /// - `Err(_)`: the address is malformed for the family it claims (or
    ///   for every family, when none is given).
    pub fn resolve(&self, family: ChainFamily) -> Result<Option<TrackedWallet>, AddressError> {
        let declared = self
            .chain
            .as_deref()
            .and_then(|c| c.parse::<ChainFamily>().ok());

        let address = match declared {
            Some(f) if f != family => return Ok(None),
            Some(f) => Address::parse(f, &self.address)?,
            None => {
                let inferred = Address::infer(&self.address)?;
                if inferred.family() != family {
                    return Ok(None);
                }
                inferred
            }
        };

        Ok(Some(TrackedWallet {
            address,
            label: self.label.clone(),
            chain: family,
        }))
    }
}

/// A wallet the pipeline is watching, with a normalized address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TrackedWallet {
    pub address: Address,
    pub label: String,
    pub chain: ChainFamily,
}

impl TrackedWallet {
    pub fn new(address: Address, label: impl Into<String>) -> Self {
        let chain = address.family();
        Self {
            address,
            label: label.into(),
            chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOL_KEY: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[test]
    fn declared_family_filters() {
        let entry = WalletEntry::new("0xABC", "W1").with_chain("EVM");
        let w = entry.resolve(ChainFamily::Evm).unwrap().unwrap();
        assert_eq!(w.address.as_str(), "0xabc");
        assert_eq!(w.label, "W1");
        assert!(entry.resolve(ChainFamily::Solana).unwrap().is_none());
    }

    #[test]
    fn missing_chain_is_inferred() {
        let entry = WalletEntry::new(SOL_KEY, "hot");
        assert!(entry.resolve(ChainFamily::Solana).unwrap().is_some());
        assert!(entry.resolve(ChainFamily::Evm).unwrap().is_none());
    }

    #[test]
    fn unknown_chain_tag_falls_back_to_inference() {
        let entry = WalletEntry::new("0xdef", "x").with_chain("INVALID");
        assert!(entry.resolve(ChainFamily::Evm).unwrap().is_some());
    }

    #[test]
    fn garbage_address_is_an_error() {
        let entry = WalletEntry::new("not-a-real-address", "Bad");
        assert!(entry.resolve(ChainFamily::Evm).is_err());
        assert!(entry.resolve(ChainFamily::Solana).is_err());
    }

    #[test]
    fn directory_payload_deserializes() {
        let entries: Vec<WalletEntry> = serde_json::from_str(
            r#"[{"address":"0xABC","label":"W1","chain":"EVM","id":"ck1"},
                {"address":"x"}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].label, "");
        assert!(entries[1].chain.is_none());
    }
}
