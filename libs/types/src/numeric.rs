//! Fixed-point decimal types for prices and volumes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! `Price` is strictly positive; `Volume` is non-negative so a fully
//! cancelled remainder can be represented as zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Order price. Strictly positive.
///
/// Serialized as a decimal string so non-self-describing formats (the
/// commit journal's bincode frames) round-trip without type hints.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Price(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Price {
    /// Validate and wrap a decimal price. Rejects zero and negatives.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string, e.g. "50000.25"
    pub fn from_str(s: &str) -> Option<Self> {
        s.parse::<Decimal>().ok().and_then(Self::try_new)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order volume. Non-negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Volume(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Volume {
    /// Validate and wrap a decimal volume. Rejects negatives.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse from a decimal string, e.g. "1.5"
    pub fn from_str(s: &str) -> Option<Self> {
        s.parse::<Decimal>().ok().and_then(Self::try_new)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Subtract, clamping at zero rather than going negative.
    pub fn saturating_sub(&self, other: Volume) -> Volume {
        Volume::try_new(self.0 - other.0).unwrap_or_else(Volume::zero)
    }
}

impl Add for Volume {
    type Output = Volume;

    fn add(self, other: Volume) -> Volume {
        Volume(self.0 + other.0)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
