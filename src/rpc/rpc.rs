use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{QuantaClock, QuantaInstant};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;
use thiserror::Error;
use url::Url;

use crate::types::cadence::CadenceJsonError;

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The node ran the script and it aborted (panic, failed force-unwrap,
    /// missing capability). Retrying at the same height cannot change the outcome.
    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<CadenceJsonError> for RpcError {
    fn from(e: CadenceJsonError) -> Self {
        RpcError::InvalidResponse(e.to_string())
    }
}

impl RpcError {
    /// Check if this error is likely transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            RpcError::RateLimitExceeded => true,
            RpcError::InvalidUrl(_) => false,
            RpcError::Http { status, message } => {
                *status >= 500 || Self::is_retryable_message(message)
            }
            RpcError::ScriptExecution(_) => false,
            RpcError::InvalidResponse(_) => false,
        }
    }

    fn is_retryable_message(msg: &str) -> bool {
        let msg_lower = msg.to_lowercase();
        msg_lower.contains("connection")
            || msg_lower.contains("timeout")
            || msg_lower.contains("timed out")
            || msg_lower.contains("unavailable")
            || msg_lower.contains("too many requests")
            || msg_lower.contains("try again")
    }
}

/// Backoff schedule for access-node calls that fail transiently.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first; 0 disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait before retry number `retry` (1-based). Doubles from
    /// `initial_delay` and never exceeds `max_delay`.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let Some(doublings) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };
        let factor = 1u32.checked_shl(doublings).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A throttled node gets the longest pause straight away.
    fn delay_after(&self, error: &RpcError, retry: u32) -> Duration {
        match error {
            RpcError::RateLimitExceeded => self.max_delay,
            _ => self.delay_for_attempt(retry),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_retries` retries are used up. The last error is returned.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::info!("'{}' succeeded on retry {}", operation_name, retry);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && retry < config.max_retries => {
                retry += 1;
                let delay = config.delay_after(&e, retry);
                tracing::warn!(
                    "'{}' failed: {}; retry {}/{} in {:?}",
                    operation_name,
                    e,
                    retry,
                    config.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if retry > 0 {
                    tracing::error!(
                        "'{}' failed after {} attempts: {}",
                        operation_name,
                        retry + 1,
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

pub type StandardRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl RateLimitConfig {
    pub fn per_second(requests_per_second: NonZeroU32) -> Self {
        Self {
            requests_per_second,
            jitter_min_ms: 5,
            jitter_max_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub url: Url,
    pub timeout: Duration,
    pub rate_limit: Option<RateLimitConfig>,
    pub retry: RetryConfig,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(30),
            rate_limit: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries).with_initial_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(300));
    }

    #[test]
    fn test_throttling_waits_the_longest_delay() {
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2));
        assert_eq!(
            config.delay_after(&RpcError::RateLimitExceeded, 1),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.delay_after(&RpcError::Transport("reset".into()), 1),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_script_failures_are_not_retryable() {
        assert!(!RpcError::ScriptExecution("panic".into()).is_retryable());
        assert!(RpcError::Transport("reset".into()).is_retryable());
        assert!(RpcError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(!RpcError::Http { status: 404, message: "not found".into() }.is_retryable());
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_retry(3), "flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RpcError::Transport("connection reset".into()))
            } else {
                Ok(7u64)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_immediately_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RpcError> = with_retry(&fast_retry(3), "script", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::ScriptExecution("could not borrow".into()))
        })
        .await;

        assert!(matches!(result, Err(RpcError::ScriptExecution(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RpcError> = with_retry(&fast_retry(2), "down", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Transport("timed out".into()))
        })
        .await;

        assert!(matches!(result, Err(RpcError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
