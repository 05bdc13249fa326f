use thiserror::Error;

use crate::decoding::{decode_purchase_event, PurchaseEvent, PurchaseEventError};
use crate::rpc::{LedgerClient, RpcError};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("missing seller address in block {block_height} (tx {transaction_id})")]
    MissingSellerAddress {
        block_height: u64,
        transaction_id: String,
    },

    #[error("malformed purchase event in block {block_height} (tx {transaction_id}): {source}")]
    MalformedEvent {
        block_height: u64,
        transaction_id: String,
        #[source]
        source: PurchaseEventError,
    },
}

/// Fetches every `event_type` event in `[start, end]` and flattens them into
/// block order, then emission order within each block.
///
/// An inverted range is an empty range.
pub async fn scan_purchase_events<C>(
    client: &C,
    event_type: &str,
    start: u64,
    end: u64,
) -> Result<Vec<PurchaseEvent>, ScanError>
where
    C: LedgerClient + ?Sized,
{
    if start > end {
        return Ok(Vec::new());
    }

    let blocks = client
        .get_events_in_height_range(event_type, start, end)
        .await?;

    let mut events = Vec::new();
    for block in &blocks {
        for raw in &block.events {
            let event = decode_purchase_event(block, raw).map_err(|source| match source {
                PurchaseEventError::MissingSellerAddress => ScanError::MissingSellerAddress {
                    block_height: block.height,
                    transaction_id: raw.transaction_id.clone(),
                },
                source => ScanError::MalformedEvent {
                    block_height: block.height,
                    transaction_id: raw.transaction_id.clone(),
                    source,
                },
            })?;
            events.push(event);
        }
    }

    tracing::debug!(
        "Scanned {} purchase events across {} blocks ({}-{})",
        events.len(),
        blocks.len(),
        start,
        end
    );

    Ok(events)
}
