use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::rpc::{BlockEvents, RawEvent};
use crate::types::cadence::CadenceValue;
use crate::types::flow::FlowAddress;

const ASSET_ID: usize = 0;
const PRICE: usize = 1;
const SELLER: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseEventError {
    #[error("payload is {found}, expected an event")]
    NotComposite { found: String },

    #[error("field {index} missing")]
    MissingField { index: usize },

    #[error("field {index} type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("missing seller address")]
    MissingSellerAddress,
}

/// A `MomentPurchased` event with the block context needed to reconcile it.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseEvent {
    pub asset_id: u64,
    pub seller: FlowAddress,
    /// Price exactly as emitted by the event.
    pub price: CadenceValue,
    pub block_height: u64,
    pub block_timestamp: DateTime<Utc>,
    pub transaction_id: String,
    pub event_index: u32,
}

/// Extracts `[id: UInt64, price: <number>, seller: Address?]` from one event.
pub fn decode_purchase_event(
    block: &BlockEvents,
    event: &RawEvent,
) -> Result<PurchaseEvent, PurchaseEventError> {
    let composite =
        event
            .payload
            .as_composite()
            .ok_or_else(|| PurchaseEventError::NotComposite {
                found: event.payload.type_name().to_string(),
            })?;
    let field = |index: usize| {
        composite
            .field(index)
            .ok_or(PurchaseEventError::MissingField { index })
    };
    let mismatch = |index: usize, expected: &'static str, found: &CadenceValue| {
        PurchaseEventError::TypeMismatch {
            index,
            expected,
            found: found.type_name().to_string(),
        }
    };

    let id_value = field(ASSET_ID)?;
    let asset_id = id_value
        .as_u64()
        .ok_or_else(|| mismatch(ASSET_ID, "UInt64", id_value))?;

    let price = field(PRICE)?;
    if !price.is_numeric() {
        return Err(mismatch(PRICE, "a number", price));
    }

    let seller_value = field(SELLER)?;
    let seller = match seller_value.as_optional() {
        Some(Some(inner)) => inner
            .as_address()
            .ok_or_else(|| mismatch(SELLER, "Address?", inner))?,
        Some(None) => return Err(PurchaseEventError::MissingSellerAddress),
        None => return Err(mismatch(SELLER, "Address?", seller_value)),
    };

    Ok(PurchaseEvent {
        asset_id,
        seller,
        price: price.clone(),
        block_height: block.height,
        block_timestamp: block.timestamp,
        transaction_id: event.transaction_id.clone(),
        event_index: event.event_index,
    })
}
