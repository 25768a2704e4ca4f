//! Human-readable resource quantities (`128Mi`, `1G`, `512MiB`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a [`Quantity`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("quantity '{0}' has no unit (expected one of Ki, Mi, Gi, Ti, k, M, G, T)")]
    MissingUnit(String),

    #[error("quantity '{value}' has unknown unit '{unit}'")]
    UnknownUnit { value: String, unit: String },

    #[error("quantity '{0}' is not a number")]
    InvalidNumber(String),

    #[error("quantity '{0}' must be greater than zero")]
    Zero(String),

    #[error("quantity '{0}' is too large")]
    Overflow(String),
}

/// A memory quantity with a mandatory unit suffix.
///
/// Binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`) are powers of 1024, decimal
/// suffixes (`k`, `M`, `G`, `T`) are powers of 1000. A trailing `B` after a
/// binary suffix is accepted, so `128MiB` equals `128Mi`. Fractions round up
/// to the next whole byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    raw: String,
    bytes: u64,
}

const UNITS: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
];

impl Quantity {
    /// Parse a quantity string.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(raw.len());
        let (number, unit) = raw.split_at(split);

        if number.is_empty() {
            return Err(QuantityError::InvalidNumber(raw.to_string()));
        }
        if unit.is_empty() {
            return Err(QuantityError::MissingUnit(raw.to_string()));
        }

        let multiplier = unit_multiplier(unit).ok_or_else(|| QuantityError::UnknownUnit {
            value: raw.to_string(),
            unit: unit.to_string(),
        })?;

        let bytes = scale(number, multiplier, raw)?;
        if bytes == 0 {
            return Err(QuantityError::Zero(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            bytes,
        })
    }

    /// Value in bytes.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Value in mebibytes, rounded up.
    #[must_use]
    pub fn mebibytes(&self) -> u64 {
        self.bytes.div_ceil(1 << 20)
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    let unit = match unit.strip_suffix('B') {
        Some(stripped) if stripped.ends_with('i') => stripped,
        _ => unit,
    };
    UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .map(|(_, multiplier)| *multiplier)
}

fn scale(number: &str, multiplier: u64, raw: &str) -> Result<u64, QuantityError> {
    let invalid = || QuantityError::InvalidNumber(raw.to_string());
    let overflow = || QuantityError::Overflow(raw.to_string());

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if whole.is_empty() || fraction.contains('.') {
        return Err(invalid());
    }

    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    let mut bytes = whole.checked_mul(multiplier).ok_or_else(overflow)?;

    if !fraction.is_empty() {
        let digits = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        let denominator = 10u128.checked_pow(digits).ok_or_else(invalid)?;
        let numerator: u128 = fraction.parse().map_err(|_| invalid())?;
        let extra = (numerator * u128::from(multiplier)).div_ceil(denominator);
        let extra = u64::try_from(extra).map_err(|_| overflow())?;
        bytes = bytes.checked_add(extra).ok_or_else(overflow)?;
    }

    Ok(bytes)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quantity {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.raw
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
