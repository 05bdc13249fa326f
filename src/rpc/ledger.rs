//! The ledger access surface the exporter depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::rpc::rpc::RpcError;
use crate::types::cadence::CadenceValue;

/// One event as emitted by a transaction, payload already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub transaction_id: String,
    pub event_index: u32,
    pub payload: CadenceValue,
}

/// Events of one block, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEvents {
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    pub events: Vec<RawEvent>,
}

/// Read access to a Flow ledger.
///
/// Implementations own connection handling and transient-failure retries;
/// callers see one `Result` per logical request.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Liveness check, used once at startup.
    async fn ping(&self) -> Result<(), RpcError>;

    /// Height of the latest sealed block.
    async fn get_latest_block_height(&self) -> Result<u64, RpcError>;

    /// Events of `event_type` in `[start, end]` (both inclusive), grouped by
    /// block in ascending height order.
    async fn get_events_in_height_range(
        &self,
        event_type: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<BlockEvents>, RpcError>;

    /// Runs a read-only Cadence script against state as of `height`.
    async fn execute_script_at_block_height(
        &self,
        script: &str,
        height: u64,
        arguments: &[CadenceValue],
    ) -> Result<CadenceValue, RpcError>;
}
