//! Strict decoding of the `SaleMoment` struct returned by the listing script.
//!
//! Fields are read by declaration position and narrowed to exactly the declared
//! Cadence type. A single bad field fails the whole decode; no partially
//! filled record is ever produced.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::cadence::{CadenceValue, Composite};
use crate::types::flow::UFix64;

const ID: usize = 0;
const PLAY_ID: usize = 1;
const PLAY: usize = 2;
const SET_ID: usize = 3;
const SET_NAME: usize = 4;
const SERIAL_NUMBER: usize = 5;
const PRICE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected a composite value, found {found}")]
    NotComposite { found: String },

    #[error("field {index} missing")]
    MissingField { index: usize },

    #[error("field {index} type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("field {index} type mismatch: attribute {part} is {found}, expected String")]
    AttributeType {
        index: usize,
        part: &'static str,
        found: String,
    },
}

/// A moment as listed for sale at some block height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleMoment {
    pub id: u64,
    pub play_id: u32,
    /// Play metadata (`FullName`, `TeamAtMoment`, ...).
    pub play: HashMap<String, String>,
    pub set_id: u32,
    pub set_name: String,
    pub serial_number: u32,
    /// Listing price read from the seller's sale collection.
    pub price: UFix64,
}

impl SaleMoment {
    pub fn play_attribute(&self, name: &str) -> Option<&str> {
        self.play.get(name).map(String::as_str)
    }
}

fn field(composite: &Composite, index: usize) -> Result<&CadenceValue, DecodeError> {
    composite
        .field(index)
        .ok_or(DecodeError::MissingField { index })
}

fn narrow<'a, T>(
    composite: &'a Composite,
    index: usize,
    expected: &'static str,
    cast: impl FnOnce(&'a CadenceValue) -> Option<T>,
) -> Result<T, DecodeError> {
    let value = field(composite, index)?;
    cast(value).ok_or_else(|| DecodeError::TypeMismatch {
        index,
        expected,
        found: value.type_name().to_string(),
    })
}

fn decode_play(composite: &Composite) -> Result<HashMap<String, String>, DecodeError> {
    let pairs = narrow(composite, PLAY, "{String: String}", CadenceValue::as_dictionary)?;

    let mut play = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        let key = key.as_str().ok_or_else(|| DecodeError::AttributeType {
            index: PLAY,
            part: "key",
            found: key.type_name().to_string(),
        })?;
        let value = value.as_str().ok_or_else(|| DecodeError::AttributeType {
            index: PLAY,
            part: "value",
            found: value.type_name().to_string(),
        })?;
        play.insert(key.to_string(), value.to_string());
    }
    Ok(play)
}

/// Decodes `[id: UInt64, playId: UInt32, play: {String: String}, setId: UInt32,
/// setName: String, serialNumber: UInt32, price: UFix64]`.
pub fn decode_sale_moment(value: &CadenceValue) -> Result<SaleMoment, DecodeError> {
    let composite = value.as_composite().ok_or_else(|| DecodeError::NotComposite {
        found: value.type_name().to_string(),
    })?;

    Ok(SaleMoment {
        id: narrow(composite, ID, "UInt64", CadenceValue::as_u64)?,
        play_id: narrow(composite, PLAY_ID, "UInt32", CadenceValue::as_u32)?,
        play: decode_play(composite)?,
        set_id: narrow(composite, SET_ID, "UInt32", CadenceValue::as_u32)?,
        set_name: narrow(composite, SET_NAME, "String", CadenceValue::as_str)?.to_string(),
        serial_number: narrow(composite, SERIAL_NUMBER, "UInt32", CadenceValue::as_u32)?,
        price: narrow(composite, PRICE, "UFix64", CadenceValue::as_ufix64)?,
    })
}
