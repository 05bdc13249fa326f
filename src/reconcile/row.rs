use chrono::{DateTime, Utc};

use crate::decoding::{PurchaseEvent, SaleMoment};

pub const CSV_HEADER: [&str; 7] = [
    "Date",
    "setID",
    "setName",
    "playID",
    "serialNumber",
    "playerName",
    "price",
];

/// Columns recovered from the listing at `height - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingColumns {
    pub set_id: u32,
    pub set_name: String,
    pub play_id: u32,
    pub serial_number: u32,
    pub player_name: String,
}

/// One exported sale. `listing` is `None` only for placeholder rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledRow {
    pub date: DateTime<Utc>,
    pub listing: Option<ListingColumns>,
    /// Event-sourced price, rendered as the chain renders it.
    pub price: String,
}

impl ReconciledRow {
    pub fn from_sale(event: &PurchaseEvent, moment: &SaleMoment, player_name_attribute: &str) -> Self {
        Self {
            date: event.block_timestamp,
            listing: Some(ListingColumns {
                set_id: moment.set_id,
                set_name: moment.set_name.clone(),
                play_id: moment.play_id,
                serial_number: moment.serial_number,
                player_name: moment
                    .play_attribute(player_name_attribute)
                    .unwrap_or_default()
                    .to_string(),
            }),
            price: event.price.to_string(),
        }
    }

    pub fn unreconciled(event: &PurchaseEvent) -> Self {
        Self {
            date: event.block_timestamp,
            listing: None,
            price: event.price.to_string(),
        }
    }

    pub fn to_record(&self, placeholder: &str) -> [String; 7] {
        let date = self.date.to_string();
        match &self.listing {
            Some(listing) => [
                date,
                listing.set_id.to_string(),
                listing.set_name.clone(),
                listing.play_id.to_string(),
                listing.serial_number.to_string(),
                listing.player_name.clone(),
                self.price.clone(),
            ],
            None => [
                date,
                placeholder.to_string(),
                placeholder.to_string(),
                placeholder.to_string(),
                placeholder.to_string(),
                placeholder.to_string(),
                self.price.clone(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::decode_sale_moment;
    use crate::testing::{block_timestamp, sale_moment_value, SaleMomentFixture};
    use crate::types::cadence::CadenceValue;

    fn event() -> PurchaseEvent {
        PurchaseEvent {
            asset_id: 42,
            seller: "0xABCD".parse().unwrap(),
            price: CadenceValue::UFix64("50.00000000".parse().unwrap()),
            block_height: 995,
            block_timestamp: block_timestamp(0),
            transaction_id: "tx".to_string(),
            event_index: 0,
        }
    }

    #[test]
    fn test_row_uses_event_price_not_listing_price() {
        let moment = decode_sale_moment(&sale_moment_value(&SaleMomentFixture {
            id: 42,
            play_id: 7,
            full_name: "Jane Doe",
            set_id: 3,
            set_name: "Genesis",
            serial_number: 11,
            price: "49.00000000",
        }))
        .unwrap();

        let row = ReconciledRow::from_sale(&event(), &moment, "FullName");
        assert_eq!(
            row.to_record("N/A"),
            [
                "2021-03-05 18:34:12 UTC",
                "3",
                "Genesis",
                "7",
                "11",
                "Jane Doe",
                "50.00000000"
            ]
        );
    }

    #[test]
    fn test_missing_player_attribute_is_empty() {
        let moment = decode_sale_moment(&sale_moment_value(&SaleMomentFixture {
            id: 42,
            play_id: 7,
            full_name: "Jane Doe",
            set_id: 3,
            set_name: "Genesis",
            serial_number: 11,
            price: "1.0",
        }))
        .unwrap();

        let row = ReconciledRow::from_sale(&event(), &moment, "PlayerName");
        assert_eq!(row.listing.unwrap().player_name, "");
    }

    #[test]
    fn test_unreconciled_row_uses_placeholder() {
        let record = ReconciledRow::unreconciled(&event()).to_record("N/A");
        assert_eq!(record[0], "2021-03-05 18:34:12 UTC");
        assert!(record[1..6].iter().all(|c| c == "N/A"));
        assert_eq!(record[6], "50.00000000");
    }
}
