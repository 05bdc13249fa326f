pub mod cadence;
pub mod config;
pub mod flow;
