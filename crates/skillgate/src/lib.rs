pub mod config;
pub mod error;
pub mod learning;
pub mod telemetry;
