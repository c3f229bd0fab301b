//! Fixed-point ledger amounts
//!
//! The ledger stores every fungible quantity (Gold, unit tokens, fees) as an
//! integer scaled by `10^18`. [`Amount`] keeps that raw value; whole-unit
//! conversions happen only at the edges (display, unit counts).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;

/// Scale factor between a whole unit and its raw ledger value
pub const WEI_PER_UNIT: u128 = 1_000_000_000_000_000_000;

/// Raw ledger quantity (wei-like units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Unlimited approval. Encoded as `2^256 - 1` on the wire, and any ledger
    /// value that does not fit in `u128` decodes to it.
    pub const MAX: Amount = Amount(u128::MAX);

    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Whole units scaled by `10^18`
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * WEI_PER_UNIT)
    }

    pub const fn wei(&self) -> u128 {
        self.0
    }

    /// Whole units, truncating any fractional remainder
    pub fn whole_units(&self) -> u64 {
        u64::try_from(self.0 / WEI_PER_UNIT).unwrap_or(u64::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_unlimited(&self) -> bool {
        *self == Self::MAX
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn checked_mul_units(self, units: u64) -> Option<Amount> {
        self.0.checked_mul(units as u128).map(Amount)
    }
}

impl Add for Amount {
    type Output = Amount;

    /// Saturates at [`Amount::MAX`]
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            return write!(f, "unlimited");
        }
        let whole = self.0 / WEI_PER_UNIT;
        let frac = self.0 % WEI_PER_UNIT;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:018}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

// u128 does not survive a trip through JSON numbers, keep it a string.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(Amount)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_round_trip() {
        let a = Amount::from_units(50);
        assert_eq!(a.wei(), 50 * WEI_PER_UNIT);
        assert_eq!(a.whole_units(), 50);
    }

    #[test]
    fn test_whole_units_truncates() {
        let a = Amount::from_wei(WEI_PER_UNIT * 3 + WEI_PER_UNIT / 2);
        assert_eq!(a.whole_units(), 3);
        assert_eq!(Amount::from_wei(WEI_PER_UNIT - 1).whole_units(), 0);
    }

    #[test]
    fn test_whole_units_saturates() {
        assert_eq!(Amount::MAX.whole_units(), u64::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_units(40).to_string(), "40");
        assert_eq!(Amount::from_wei(10_000_000_000_000_000).to_string(), "0.01");
        assert_eq!(Amount::from_wei(WEI_PER_UNIT + 5 * 10u128.pow(16)).to_string(), "1.05");
        assert_eq!(Amount::MAX.to_string(), "unlimited");
    }

    #[test]
    fn test_arithmetic() {
        let a = Amount::from_units(10);
        assert_eq!(a + Amount::from_units(5), Amount::from_units(15));
        assert_eq!(Amount::MAX + a, Amount::MAX);
        assert_eq!(a.saturating_sub(Amount::from_units(20)), Amount::ZERO);
        assert_eq!(a.checked_add(Amount::MAX), None);
        assert_eq!(Amount::from_units(1).checked_mul_units(7), Some(Amount::from_units(7)));
    }

    #[test]
    fn test_serde_string() {
        let a = Amount::from_units(2);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"2000000000000000000\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
