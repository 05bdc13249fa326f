mod exporter;

pub use exporter::{ContractAddresses, ExporterConfig, MissingRowPolicy};
