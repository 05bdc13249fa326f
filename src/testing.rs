//! In-memory ledger and value builders shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::rpc::{BlockEvents, LedgerClient, RawEvent, RpcError};
use crate::types::cadence::{CadenceValue, Composite, CompositeKind};
use crate::types::flow::FlowAddress;

pub const PURCHASE_EVENT_ID: &str = "A.c1e4f4f4c4257510.Market.MomentPurchased";

pub struct SaleMomentFixture {
    pub id: u64,
    pub play_id: u32,
    pub full_name: &'static str,
    pub set_id: u32,
    pub set_name: &'static str,
    pub serial_number: u32,
    pub price: &'static str,
}

pub fn sale_moment_value(f: &SaleMomentFixture) -> CadenceValue {
    CadenceValue::Composite(Composite {
        kind: CompositeKind::Struct,
        id: "s.0000000000000000000000000000000000000000000000000000000000000000.SaleMoment"
            .to_string(),
        fields: vec![
            ("id".to_string(), CadenceValue::UInt64(f.id)),
            ("playId".to_string(), CadenceValue::UInt32(f.play_id)),
            (
                "play".to_string(),
                CadenceValue::Dictionary(vec![(
                    CadenceValue::String("FullName".to_string()),
                    CadenceValue::String(f.full_name.to_string()),
                )]),
            ),
            ("setId".to_string(), CadenceValue::UInt32(f.set_id)),
            ("setName".to_string(), CadenceValue::String(f.set_name.to_string())),
            ("serialNumber".to_string(), CadenceValue::UInt32(f.serial_number)),
            (
                "price".to_string(),
                CadenceValue::UFix64(f.price.parse().expect("fixture price")),
            ),
        ],
    })
}

pub fn purchase_event_value(id: u64, price: &str, seller: Option<FlowAddress>) -> CadenceValue {
    CadenceValue::Composite(Composite {
        kind: CompositeKind::Event,
        id: PURCHASE_EVENT_ID.to_string(),
        fields: vec![
            ("id".to_string(), CadenceValue::UInt64(id)),
            (
                "price".to_string(),
                CadenceValue::UFix64(price.parse().expect("fixture price")),
            ),
            (
                "seller".to_string(),
                CadenceValue::Optional(seller.map(|a| Box::new(CadenceValue::Address(a)))),
            ),
        ],
    })
}

/// Block timestamp used by fixtures: 2021-03-05 18:34:12 UTC plus `height` seconds.
pub fn block_timestamp(height: u64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 5, 18, 34, 12).unwrap() + chrono::Duration::seconds(height as i64)
}

pub fn block_events(height: u64, payloads: Vec<CadenceValue>) -> BlockEvents {
    BlockEvents {
        height,
        timestamp: block_timestamp(height),
        events: payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| RawEvent {
                transaction_id: format!("tx-{}-{}", height, i),
                event_index: 0,
                payload,
            })
            .collect(),
    }
}

type ListingKey = (u64, FlowAddress, u64);

/// Scriptable `LedgerClient`. Listings that were never registered behave like
/// a script that panicked on a missing capability.
pub struct MockLedger {
    latest_height: Mutex<Result<u64, RpcError>>,
    blocks: Mutex<Vec<BlockEvents>>,
    events_error: Mutex<Option<RpcError>>,
    listings: Mutex<HashMap<ListingKey, Result<CadenceValue, RpcError>>>,
    listing_delays: Mutex<HashMap<ListingKey, Duration>>,
    script_calls: Mutex<Vec<ListingKey>>,
}

impl MockLedger {
    pub fn new(latest_height: u64) -> Self {
        Self {
            latest_height: Mutex::new(Ok(latest_height)),
            blocks: Mutex::new(Vec::new()),
            events_error: Mutex::new(None),
            listings: Mutex::new(HashMap::new()),
            listing_delays: Mutex::new(HashMap::new()),
            script_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_latest_height(&self, error: RpcError) {
        *self.latest_height.lock().unwrap() = Err(error);
    }

    pub fn fail_events(&self, error: RpcError) {
        *self.events_error.lock().unwrap() = Some(error);
    }

    pub fn push_block(&self, block: BlockEvents) {
        self.blocks.lock().unwrap().push(block);
    }

    pub fn set_listing(
        &self,
        height: u64,
        owner: FlowAddress,
        asset_id: u64,
        result: Result<CadenceValue, RpcError>,
    ) {
        self.listings
            .lock()
            .unwrap()
            .insert((height, owner, asset_id), result);
    }

    /// Holds the reply for this listing back by `delay`.
    pub fn delay_listing(&self, height: u64, owner: FlowAddress, asset_id: u64, delay: Duration) {
        self.listing_delays
            .lock()
            .unwrap()
            .insert((height, owner, asset_id), delay);
    }

    /// `(height, owner, asset_id)` of every script execution, in call order.
    pub fn script_calls(&self) -> Vec<ListingKey> {
        self.script_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn ping(&self) -> Result<(), RpcError> {
        Ok(())
    }

    async fn get_latest_block_height(&self) -> Result<u64, RpcError> {
        self.latest_height.lock().unwrap().clone()
    }

    async fn get_events_in_height_range(
        &self,
        _event_type: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<BlockEvents>, RpcError> {
        if let Some(error) = self.events_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.height >= start && b.height <= end)
            .cloned()
            .collect())
    }

    async fn execute_script_at_block_height(
        &self,
        _script: &str,
        height: u64,
        arguments: &[CadenceValue],
    ) -> Result<CadenceValue, RpcError> {
        let owner = arguments
            .first()
            .and_then(CadenceValue::as_address)
            .ok_or_else(|| RpcError::ScriptExecution("owner argument missing".into()))?;
        let asset_id = arguments
            .get(1)
            .and_then(CadenceValue::as_u64)
            .ok_or_else(|| RpcError::ScriptExecution("momentID argument missing".into()))?;

        let key = (height, owner, asset_id);
        self.script_calls.lock().unwrap().push(key);

        let delay = self.listing_delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.listings
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| {
                Err(RpcError::ScriptExecution(
                    "Could not borrow capability from public collection".into(),
                ))
            })
    }
}
