mod flow;
mod ledger;
mod rpc;

pub use flow::FlowAccessClient;
pub use ledger::{BlockEvents, LedgerClient, RawEvent};
pub use rpc::{RateLimitConfig, RetryConfig, RpcClientConfig, RpcError};
