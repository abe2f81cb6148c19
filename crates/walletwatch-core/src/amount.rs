//! Arbitrary-precision unsigned amounts.
//!
//! Fees, values, block numbers and token amounts are carried as 256-bit
//! integers end to end and cross the persistence boundary as decimal
//! strings, never as floats.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn from_u64(v: u64) -> Self {
        Amount(U256::from(v))
    }

    /// Parse decimal or `0x`-prefixed hex.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        U256::from_str(s).ok().map(Amount)
    }

    pub fn checked_mul(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_mul(rhs.0).map(Amount)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Amount::from_u64(v)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Num(u64),
    Str(String),
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match AmountRepr::deserialize(deserializer)? {
            AmountRepr::Num(n) => Ok(Amount::from_u64(n)),
            AmountRepr::Str(s) => Amount::parse(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid amount `{s}`"))),
        }
    }
}
