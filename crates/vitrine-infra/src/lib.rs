//! Vitrine Infrastructure Library
//!
//! Process-wide concerns shared by binaries: tracing subscriber setup.

pub mod telemetry;

pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
