//! Helpers shared by the `vitrine` binary.

use anyhow::Context;
use serde::Serialize;
use vitrine_core::{AppError, ClassifiedError, ErrorMetadata, UploadResult};
use vitrine_infra::TelemetryConfig;

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// One status line for a succeeded file.
pub fn success_row(result: &UploadResult) -> String {
    let mut size = format_size(result.size_bytes);
    if result.size_bytes < result.original_size_bytes {
        size = format!("{} (was {})", size, format_size(result.original_size_bytes));
    }
    format!(
        "  ok      {:<32} {:<22} {}",
        truncate_string(&result.original_file_name, 32),
        size,
        result.access_url()
    )
}

/// Status lines for a failed file: the message for its classification,
/// then what the user can do about it.
pub fn failure_row(error: &ClassifiedError) -> String {
    let mut row = format!(
        "  failed  {:<32} [{}] {}",
        truncate_string(&error.file_name, 32),
        error.kind,
        error.client_message()
    );
    if let Some(cause) = &error.cause {
        row.push_str(&format!(": {}", cause));
    }
    if let Some(path) = &error.orphaned_path {
        row.push_str(&format!(" (left at {})", path));
    }
    if let Some(action) = error.suggested_action() {
        row.push_str(&format!("\n          {}", action));
    }
    row
}

/// Print a command failure, with a hint when the error carries one.
pub fn report_error(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
    if let Some(action) = err
        .downcast_ref::<AppError>()
        .and_then(|e| e.suggested_action())
    {
        eprintln!("Hint: {}", action);
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Initialize tracing for the CLI. Quiet unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    let config = TelemetryConfig::from_env("vitrine-cli", env!("CARGO_PKG_VERSION"))
        .with_default_filter("vitrine=warn");
    if let Err(e) = vitrine_infra::init_telemetry(&config) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}
