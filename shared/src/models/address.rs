//! Address Model

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("address must be 40 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
}

/// 20-byte ledger account or contract identifier.
///
/// The all-zero address is what the ledger returns for "nobody" (e.g. an
/// unowned location); use [`Address::non_zero`] to turn it into `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `None` for the zero address
    pub fn non_zero(self) -> Option<Self> {
        if self.is_zero() { None } else { Some(self) }
    }

    /// Short display form, `0x1234...abcd`
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError::MissingPrefix(s.to_string()))?;
        if digits.len() != 40 {
            return Err(AddressParseError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
