//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (field order is the wire order)
//! - Exact arithmetic (checked, non-negative integer amounts)
//! - Detached values: nothing here touches storage

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Non-negative integer token amount.
///
/// Backed by a scale-0 [`Decimal`], so the ledger capacity is
/// [`Amount::MAX`] (2^96 - 1). Arithmetic is checked and never wraps or
/// goes negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    /// Largest representable amount
    pub const MAX: Amount = Amount(Decimal::MAX);

    /// Zero
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create from an integer
    pub fn new(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Is this amount zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .filter(|sum| sum.scale() == 0)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Checked subtraction, fails instead of going negative
    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        if other > self {
            return Err(Error::AmountUnderflow);
        }
        Ok(Amount(self.0 - other.0))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl FromStr for Amount {
    type Err = Error;

    /// Parse the canonical decimal form: ASCII digits, no sign, no leading zeros.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidAmount(format!("not a decimal integer: {:?}", s)));
        }
        if s.len() > 1 && s.starts_with('0') {
            return Err(Error::InvalidAmount(format!("leading zeros: {:?}", s)));
        }

        let value = Decimal::from_str(s).map_err(|_| Error::AmountOverflow)?;
        // Anything rust_decimal had to round does not fit.
        if value.scale() != 0 || value.to_string() != s {
            return Err(Error::AmountOverflow);
        }
        Ok(Amount(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Provenance edge: how much of a TXO's value came from an earlier TXO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxoRef {
    /// Id of the source TXO
    #[serde(rename = "id")]
    pub source_id: String,

    /// Amount drawn from the source
    pub amount: Amount,
}

impl TxoRef {
    /// Create new reference
    pub fn new(source_id: impl Into<String>, amount: Amount) -> Self {
        Self {
            source_id: source_id.into(),
            amount,
        }
    }
}

/// Tracked output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Txo {
    /// Creation time (nanoseconds by convention, caller-supplied)
    pub timestamp: i64,

    /// Current holder
    pub owner: String,

    /// Globally unique id (caller-supplied)
    pub id: String,

    /// Asset denomination
    pub token: String,

    /// Value created at this output, fixed for its lifetime
    pub amount: Amount,

    /// Value already drawn by later TXOs
    pub used_amount: Amount,

    /// Earlier outputs that funded this one (empty for mints)
    #[serde(with = "nullable_list")]
    pub ref_list: Vec<TxoRef>,
}

impl Txo {
    /// Mint a fresh, unused output
    pub fn mint(
        timestamp: i64,
        owner: impl Into<String>,
        id: impl Into<String>,
        token: impl Into<String>,
        amount: Amount,
        ref_list: Vec<TxoRef>,
    ) -> Self {
        Self {
            timestamp,
            owner: owner.into(),
            id: id.into(),
            token: token.into(),
            amount,
            used_amount: Amount::zero(),
            ref_list,
        }
    }

    /// Unspent value left in this output
    pub fn remaining(&self) -> Result<Amount> {
        self.amount.checked_sub(self.used_amount).map_err(|_| {
            Error::InvariantViolation(format!(
                "TXO {} used {} of {}",
                self.id, self.used_amount, self.amount
            ))
        })
    }

    /// Whether every unit has been drawn
    pub fn is_all_used(&self) -> bool {
        self.amount == self.used_amount
    }

    /// Whether this output was minted from outside the ledger
    pub fn is_mint(&self) -> bool {
        self.ref_list.is_empty()
    }
}

/// Per-(owner, token) list of not yet fully spent TXO ids, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet owner
    pub owner: String,

    /// Asset denomination
    pub token: String,

    /// TXO ids in spend order
    #[serde(rename = "txos", with = "nullable_list")]
    pub txo_ids: Vec<String>,
}

impl Wallet {
    /// Create empty wallet
    pub fn new(owner: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            token: token.into(),
            txo_ids: Vec::new(),
        }
    }
}

/// Empty lists are written as `null` and `null` reads back as empty.
mod nullable_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(list: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        if list.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(list)
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}
