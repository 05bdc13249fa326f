mod driver;
mod row;

pub use driver::{run, ExportSettings, RunError, RunReport};
pub use row::{ListingColumns, ReconciledRow, CSV_HEADER};
