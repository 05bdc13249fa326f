//! Flow Access API client over the node's REST interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use governor::{Jitter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::rpc::ledger::{BlockEvents, LedgerClient, RawEvent};
use crate::rpc::rpc::{with_retry, RpcClientConfig, RpcError, StandardRateLimiter};
use crate::types::cadence::CadenceValue;

/// Widest height range the access API serves in one events request.
pub const MAX_EVENT_HEIGHT_RANGE: u64 = 250;

#[derive(Debug, Deserialize)]
struct BlockResponse {
    header: BlockHeaderResponse,
}

#[derive(Debug, Deserialize)]
struct BlockHeaderResponse {
    height: String,
}

#[derive(Debug, Deserialize)]
struct BlockEventsResponse {
    block_height: String,
    block_timestamp: String,
    #[serde(default)]
    events: Vec<EventResponse>,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    transaction_id: String,
    event_index: String,
    payload: String,
}

#[derive(Debug, Serialize)]
struct ScriptRequest {
    script: String,
    arguments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

pub struct FlowAccessClient {
    http: reqwest::Client,
    config: RpcClientConfig,
    rate_limiter: Option<Arc<StandardRateLimiter>>,
    jitter: Option<Jitter>,
}

impl FlowAccessClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let (rate_limiter, jitter) = if let Some(ref rate_config) = config.rate_limit {
            let quota = Quota::per_second(rate_config.requests_per_second);
            let limiter = RateLimiter::direct(quota);
            let jitter = Jitter::new(
                Duration::from_millis(rate_config.jitter_min_ms),
                Duration::from_millis(rate_config.jitter_max_ms),
            );
            (Some(Arc::new(limiter)), Some(jitter))
        } else {
            (None, None)
        };

        Ok(Self {
            http,
            config,
            rate_limiter,
            jitter,
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let (Some(limiter), Some(jitter)) = (&self.rate_limiter, &self.jitter) {
            limiter.until_ready_with_jitter(*jitter).await;
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, RpcError> {
        let base = self.config.url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/v1/{}", base, path))
            .map_err(|e| RpcError::InvalidUrl(e.to_string()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, RpcError> {
        self.wait_for_rate_limit().await;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        parse_response(response, false).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &B,
        is_script: bool,
    ) -> Result<T, RpcError> {
        self.wait_for_rate_limit().await;
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        parse_response(response, is_script).await
    }

    async fn get_events_chunk(
        &self,
        event_type: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<BlockEvents>, RpcError> {
        let url = self.endpoint(
            "events",
            &[
                ("type", event_type.to_string()),
                ("start_height", start.to_string()),
                ("end_height", end.to_string()),
            ],
        )?;
        let op_name = format!("events({}, {}-{})", event_type, start, end);
        let blocks: Vec<BlockEventsResponse> =
            with_retry(&self.config.retry, &op_name, || self.get_json(&url)).await?;

        blocks.into_iter().map(convert_block_events).collect()
    }
}

/// Maps a non-success status to an error; HTTP 400 on the scripts endpoint is
/// how the node reports a script that aborted.
async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
    is_script: bool,
) -> Result<T, RpcError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    Err(match status.as_u16() {
        400 if is_script => RpcError::ScriptExecution(message),
        429 => RpcError::RateLimitExceeded,
        code => RpcError::Http {
            status: code,
            message,
        },
    })
}

fn parse_u64(field: &str, raw: &str) -> Result<u64, RpcError> {
    raw.trim()
        .parse()
        .map_err(|_| RpcError::InvalidResponse(format!("{} '{}' is not a number", field, raw)))
}

fn parse_u32(field: &str, raw: &str) -> Result<u32, RpcError> {
    raw.trim()
        .parse()
        .map_err(|_| RpcError::InvalidResponse(format!("{} '{}' is not a number", field, raw)))
}

fn convert_block_events(block: BlockEventsResponse) -> Result<BlockEvents, RpcError> {
    let height = parse_u64("block_height", &block.block_height)?;
    let timestamp = DateTime::parse_from_rfc3339(&block.block_timestamp)
        .map_err(|e| {
            RpcError::InvalidResponse(format!(
                "block_timestamp '{}': {}",
                block.block_timestamp, e
            ))
        })?
        .with_timezone(&Utc);

    let events = block
        .events
        .into_iter()
        .map(|event| -> Result<RawEvent, RpcError> {
            Ok(RawEvent {
                payload: CadenceValue::from_base64_json(&event.payload)?,
                event_index: parse_u32("event_index", &event.event_index)?,
                transaction_id: event.transaction_id,
            })
        })
        .collect::<Result<Vec<_>, RpcError>>()?;

    Ok(BlockEvents {
        height,
        timestamp,
        events,
    })
}

#[async_trait]
impl LedgerClient for FlowAccessClient {
    async fn ping(&self) -> Result<(), RpcError> {
        let url = self.endpoint("network/parameters", &[])?;
        with_retry(&self.config.retry, "ping", || async {
            self.get_json::<serde_json::Value>(&url).await.map(|_| ())
        })
        .await
    }

    async fn get_latest_block_height(&self) -> Result<u64, RpcError> {
        let url = self.endpoint("blocks", &[("height", "sealed".to_string())])?;
        let blocks: Vec<BlockResponse> =
            with_retry(&self.config.retry, "latest_sealed_block", || self.get_json(&url)).await?;

        let block = blocks
            .first()
            .ok_or_else(|| RpcError::InvalidResponse("no sealed block returned".to_string()))?;
        parse_u64("height", &block.header.height)
    }

    async fn get_events_in_height_range(
        &self,
        event_type: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<BlockEvents>, RpcError> {
        let mut all_blocks = Vec::new();
        if start > end {
            return Ok(all_blocks);
        }

        let mut chunk_start = start;
        loop {
            let chunk_end = end.min(chunk_start.saturating_add(MAX_EVENT_HEIGHT_RANGE - 1));
            let mut blocks = self.get_events_chunk(event_type, chunk_start, chunk_end).await?;
            blocks.sort_by_key(|b| b.height);
            all_blocks.extend(blocks);

            if chunk_end >= end {
                break;
            }
            chunk_start = chunk_end + 1;
        }

        Ok(all_blocks)
    }

    async fn execute_script_at_block_height(
        &self,
        script: &str,
        height: u64,
        arguments: &[CadenceValue],
    ) -> Result<CadenceValue, RpcError> {
        let url = self.endpoint("scripts", &[("block_height", height.to_string())])?;
        let request = ScriptRequest {
            script: STANDARD.encode(script),
            arguments: arguments.iter().map(CadenceValue::to_base64_json).collect(),
        };
        let op_name = format!("script(block_height={})", height);
        let encoded: String = with_retry(&self.config.retry, &op_name, || {
            self.post_json(&url, &request, true)
        })
        .await?;

        Ok(CadenceValue::from_base64_json(&encoded)?)
    }
}

impl std::fmt::Debug for FlowAccessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowAccessClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}
