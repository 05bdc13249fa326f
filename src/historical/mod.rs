mod events;
mod sale_moment;

pub use events::{scan_purchase_events, ScanError};
pub use sale_moment::{query_sale_moment_at_height, sale_moment_script, QueryError};
