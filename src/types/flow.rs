//! Fixed-width Flow primitives: account addresses and Cadence fixed-point numbers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of fractional digits carried by `Fix64` and `UFix64`.
pub const FIX64_DECIMALS: usize = 8;
const FIX64_SCALE: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowTypeError {
    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, String),

    #[error("Invalid fixed-point number '{0}': {1}")]
    InvalidFixedPoint(String, String),
}

/// An 8-byte Flow account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowAddress(pub [u8; 8]);

impl FlowAddress {
    pub const LENGTH: usize = 8;

    /// Builds an address from raw bytes, left-padding short input with zeros and
    /// keeping the trailing 8 bytes of long input.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; Self::LENGTH];
        if bytes.len() >= Self::LENGTH {
            out.copy_from_slice(&bytes[bytes.len() - Self::LENGTH..]);
        } else {
            out[Self::LENGTH - bytes.len()..].copy_from_slice(bytes);
        }
        Self(out)
    }
}

impl FromStr for FlowAddress {
    type Err = FlowTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(FlowTypeError::InvalidAddress(
                s.to_string(),
                "empty address".to_string(),
            ));
        }
        if digits.len() > Self::LENGTH * 2 {
            return Err(FlowTypeError::InvalidAddress(
                s.to_string(),
                format!("longer than {} bytes", Self::LENGTH),
            ));
        }

        let padded = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(&padded)
            .map_err(|e| FlowTypeError::InvalidAddress(s.to_string(), e.to_string()))?;
        Ok(Self::from_slice(&bytes))
    }
}

impl fmt::Display for FlowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for FlowAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FlowAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Splits `"12.5"` into integer and fractional parts scaled by 10^8.
fn parse_unsigned_fixed(s: &str) -> Result<u64, FlowTypeError> {
    let invalid = |reason: &str| FlowTypeError::InvalidFixedPoint(s.to_string(), reason.to_string());

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("integer part must be decimal digits"));
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("fractional part must be decimal digits"));
    }
    if frac_part.len() > FIX64_DECIMALS {
        return Err(invalid("more than 8 fractional digits"));
    }

    let integer: u64 = int_part.parse().map_err(|_| invalid("integer part out of range"))?;
    let fraction: u64 = if frac_part.is_empty() {
        0
    } else {
        let scaled = format!("{:0<width$}", frac_part, width = FIX64_DECIMALS);
        scaled.parse().map_err(|_| invalid("fractional part out of range"))?
    };

    integer
        .checked_mul(FIX64_SCALE)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| invalid("value out of range"))
}

/// Cadence `UFix64`: unsigned, 8 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
/// Stored scaled by 10^8.
pub struct UFix64(u64);

impl FromStr for UFix64 {
    type Err = FlowTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_unsigned_fixed(s.trim()).map(Self)
    }
}

impl fmt::Display for UFix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / FIX64_SCALE,
            self.0 % FIX64_SCALE,
            width = FIX64_DECIMALS
        )
    }
}

/// Cadence `Fix64`: signed, 8 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Fix64(i64);

impl FromStr for Fix64 {
    type Err = FlowTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, magnitude) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let raw = parse_unsigned_fixed(magnitude)?;
        let out_of_range =
            || FlowTypeError::InvalidFixedPoint(s.to_string(), "value out of range".to_string());

        if negative {
            // i64::MIN has no positive counterpart
            if raw == i64::MIN.unsigned_abs() {
                return Ok(Self(i64::MIN));
            }
            let value = i64::try_from(raw).map_err(|_| out_of_range())?;
            Ok(Self(-value))
        } else {
            i64::try_from(raw).map(Self).map_err(|_| out_of_range())
        }
    }
}

impl fmt::Display for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            magnitude / FIX64_SCALE,
            magnitude % FIX64_SCALE,
            width = FIX64_DECIMALS
        )
    }
}
