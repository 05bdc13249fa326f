mod csv_sink;
mod sqlite_import;

pub use csv_sink::{CsvRowSink, RowSink, SinkError};
pub use sqlite_import::SalesDatabase;
