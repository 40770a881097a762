use serde::{Deserialize, Serialize};
use std::fmt;

/// An amount of the marketplace's payment token, in indivisible base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul(&self, factor: u64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Even split across `n` recipients: (per-recipient share, remainder).
    pub fn split_evenly(&self, n: u64) -> (Self, Self) {
        if n == 0 {
            return (Self::ZERO, *self);
        }
        (Self(self.0 / n), Self(self.0 % n))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque 32-byte account identity, authenticated by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The reserved account holding all marketplace funds (escrow, stakes, fees).
    pub fn market() -> Self {
        Self([0xFF; 32])
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_evenly() {
        let (share, rem) = TokenAmount::from_base_units(10).split_evenly(3);
        assert_eq!(share, TokenAmount::from_base_units(3));
        assert_eq!(rem, TokenAmount::from_base_units(1));

        let (share, rem) = TokenAmount::from_base_units(10).split_evenly(5);
        assert_eq!(share, TokenAmount::from_base_units(2));
        assert_eq!(rem, TokenAmount::ZERO);
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = TokenAmount::from_base_units(u64::MAX);
        assert!(max.checked_add(TokenAmount::from_base_units(1)).is_none());
        assert!(TokenAmount::ZERO.checked_sub(TokenAmount::from_base_units(1)).is_none());
        assert!(max.checked_mul(2).is_none());
    }

    #[test]
    fn test_market_address_is_stable() {
        assert_eq!(AccountAddress::market(), AccountAddress::market());
        assert_ne!(AccountAddress::market(), AccountAddress::from_bytes([1u8; 32]));
    }
}
