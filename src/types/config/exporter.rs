use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::rpc::{RateLimitConfig, RetryConfig, RpcClientConfig};
use crate::types::flow::FlowAddress;

pub const DEFAULT_ENDPOINT: &str = "https://rest-mainnet.onflow.org";
pub const DEFAULT_ENDPOINT_ENV_VAR: &str = "FLOW_ACCESS_URL";
pub const DEFAULT_EVENT_TYPE: &str = "A.c1e4f4f4c4257510.Market.MomentPurchased";

/// Deployment addresses imported by the listing script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContractAddresses {
    pub top_shot: FlowAddress,
    pub market: FlowAddress,
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            top_shot: FlowAddress([0x0b, 0x2a, 0x32, 0x99, 0xcc, 0x85, 0x7e, 0x29]),
            market: FlowAddress([0xc1, 0xe4, 0xf4, 0xf4, 0xc4, 0x25, 0x75, 0x10]),
        }
    }
}

/// What to write for a sale whose listing could not be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MissingRowPolicy {
    /// Leave the sale out of the export; it is still reported.
    #[default]
    Skip,
    /// Write the sale with every listing-derived column set to the placeholder.
    Placeholder,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
    /// Client-side request cap; unlimited when absent.
    pub requests_per_second: Option<NonZeroU32>,
}

impl Default for RpcSettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            timeout_secs: 30,
            requests_per_second: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Access node URL. Falls back to `endpoint_env_var`, then mainnet.
    pub endpoint: Option<String>,
    pub endpoint_env_var: String,
    /// Blocks to scan back from the sealed head.
    pub window_size: u64,
    pub event_type: String,
    pub output_path: PathBuf,
    pub contracts: ContractAddresses,
    /// Play attribute written to the `playerName` column.
    pub player_name_attribute: String,
    pub missing_rows: MissingRowPolicy,
    pub placeholder: String,
    /// Listing queries kept in flight at once; 1 means strictly sequential.
    pub query_concurrency: usize,
    pub rpc: RpcSettings,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            endpoint_env_var: DEFAULT_ENDPOINT_ENV_VAR.to_string(),
            window_size: 10,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            output_path: PathBuf::from("result.csv"),
            contracts: ContractAddresses::default(),
            player_name_attribute: "FullName".to_string(),
            missing_rows: MissingRowPolicy::Skip,
            placeholder: "N/A".to_string(),
            query_concurrency: 1,
            rpc: RpcSettings::default(),
        }
    }
}

impl ExporterConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let config: ExporterConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given; otherwise the default location if it exists,
    /// else built-in defaults.
    pub fn load_or_default(path: Option<&Path>, default_path: &Path) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if default_path.exists() => Self::load(default_path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.event_type.trim().is_empty(), "event_type must not be empty");
        anyhow::ensure!(self.query_concurrency >= 1, "query_concurrency must be at least 1");
        anyhow::ensure!(
            self.missing_rows != MissingRowPolicy::Placeholder || !self.placeholder.is_empty(),
            "placeholder must not be empty when missing_rows is 'placeholder'"
        );
        // A numeric marker would be indistinguishable from real listing data.
        anyhow::ensure!(
            self.placeholder.trim().parse::<f64>().is_err(),
            "placeholder '{}' must not be a number",
            self.placeholder
        );
        Ok(())
    }

    /// Endpoint precedence: explicit value, then the configured environment
    /// variable (loading `.env` if needed), then mainnet.
    pub fn resolve_endpoint(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        if let Ok(endpoint) = std::env::var(&self.endpoint_env_var) {
            return endpoint;
        }
        if dotenvy::dotenv().is_ok() {
            if let Ok(endpoint) = std::env::var(&self.endpoint_env_var) {
                return endpoint;
            }
        }
        DEFAULT_ENDPOINT.to_string()
    }

    pub fn rpc_client_config(&self, endpoint: &str) -> anyhow::Result<RpcClientConfig> {
        let url = Url::parse(endpoint)
            .with_context(|| format!("Invalid access node endpoint '{}'", endpoint))?;
        let retry = RetryConfig::new(self.rpc.max_retries)
            .with_initial_delay(Duration::from_millis(self.rpc.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.rpc.max_delay_ms));

        let mut config = RpcClientConfig::new(url)
            .with_timeout(Duration::from_secs(self.rpc.timeout_secs))
            .with_retry(retry);
        if let Some(rps) = self.rpc.requests_per_second {
            config = config.with_rate_limit(RateLimitConfig::per_second(rps));
        }
        Ok(config)
    }
}
