//! Telemetry initialization
//!
//! Installs a `tracing` subscriber filtered by `RUST_LOG`, printing either
//! human-readable lines or JSON.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
