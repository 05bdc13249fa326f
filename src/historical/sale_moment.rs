//! Sale listing lookup against historical chain state.

use thiserror::Error;

use crate::decoding::{decode_sale_moment, DecodeError, SaleMoment};
use crate::rpc::{LedgerClient, RpcError};
use crate::types::cadence::CadenceValue;
use crate::types::config::ContractAddresses;
use crate::types::flow::FlowAddress;

const TOP_SHOT_PLACEHOLDER: &str = "{{TOP_SHOT}}";
const MARKET_PLACEHOLDER: &str = "{{MARKET}}";

/// Borrows the seller's public sale collection and rebuilds the listed moment
/// together with its listing price. Panics (and so fails the script) when the
/// collection or the moment is absent at the requested height.
const GET_SALE_MOMENT_SCRIPT: &str = r#"
import TopShot from {{TOP_SHOT}}
import Market from {{MARKET}}

pub struct SaleMoment {
    pub var id: UInt64
    pub var playId: UInt32
    pub var play: {String: String}
    pub var setId: UInt32
    pub var setName: String
    pub var serialNumber: UInt32
    pub var price: UFix64

    init(moment: &TopShot.NFT, price: UFix64) {
        self.id = moment.id
        self.playId = moment.data.playID
        self.play = TopShot.getPlayMetaData(playID: self.playId)!
        self.setId = moment.data.setID
        self.setName = TopShot.getSetName(setID: self.setId)!
        self.serialNumber = moment.data.serialNumber
        self.price = price
    }
}

pub fun main(owner: Address, momentID: UInt64): SaleMoment {
    let acct = getAccount(owner)
    let collectionRef = acct.getCapability(/public/topshotSaleCollection)
        .borrow<&{Market.SalePublic}>()
        ?? panic("Could not borrow capability from public collection")
    return SaleMoment(
        moment: collectionRef.borrowMoment(id: momentID)!,
        price: collectionRef.getPrice(tokenID: momentID)!
    )
}
"#;

/// Renders the listing script against the given contract deployment.
pub fn sale_moment_script(contracts: &ContractAddresses) -> String {
    GET_SALE_MOMENT_SCRIPT
        .replace(TOP_SHOT_PLACEHOLDER, &contracts.top_shot.to_string())
        .replace(MARKET_PLACEHOLDER, &contracts.market.to_string())
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("moment {asset_id} not listed by {owner} at height {height}: {message}")]
    NotFound {
        owner: FlowAddress,
        asset_id: u64,
        height: u64,
        message: String,
    },

    #[error("transport failure querying moment {asset_id} at height {height}: {source}")]
    Transport {
        asset_id: u64,
        height: u64,
        #[source]
        source: RpcError,
    },

    /// The node answered, but the result was not valid JSON-Cadence.
    #[error("malformed script result for moment {asset_id} at height {height}: {message}")]
    MalformedResult {
        asset_id: u64,
        height: u64,
        message: String,
    },

    #[error("undecodable sale moment {asset_id} at height {height}: {source}")]
    Decode {
        asset_id: u64,
        height: u64,
        #[source]
        source: DecodeError,
    },
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound { .. })
    }
}

/// Looks up `asset_id` in `owner`'s sale collection as of `height`.
pub async fn query_sale_moment_at_height<C>(
    client: &C,
    script: &str,
    height: u64,
    owner: FlowAddress,
    asset_id: u64,
) -> Result<SaleMoment, QueryError>
where
    C: LedgerClient + ?Sized,
{
    let arguments = [CadenceValue::Address(owner), CadenceValue::UInt64(asset_id)];

    let value = client
        .execute_script_at_block_height(script, height, &arguments)
        .await
        .map_err(|e| match e {
            RpcError::ScriptExecution(message) => QueryError::NotFound {
                owner,
                asset_id,
                height,
                message,
            },
            RpcError::InvalidResponse(message) => QueryError::MalformedResult {
                asset_id,
                height,
                message,
            },
            other => QueryError::Transport {
                asset_id,
                height,
                source: other,
            },
        })?;

    let moment = decode_sale_moment(&value).map_err(|source| QueryError::Decode {
        asset_id,
        height,
        source,
    })?;

    tracing::debug!(
        "Resolved moment {} (set {}, serial {}) for {} at height {}",
        moment.id,
        moment.set_id,
        moment.serial_number,
        owner,
        height
    );

    Ok(moment)
}
