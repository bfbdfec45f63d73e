//! Pipeline-wide defaults.

use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Fixed wait before the first metadata lookup; covers write-visibility lag.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_LIST_ATTEMPTS: u32 = 3;
pub const DEFAULT_LIST_RETRY_DELAY: Duration = Duration::from_millis(1000);

pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_MAX_FILE_SIZE_MB: usize = 10;
pub const DEFAULT_COMPRESSION_MAX_SIZE_KB: usize = 1024;
pub const DEFAULT_COMPRESSION_MAX_DIMENSION: u32 = 1920;

pub const DEFAULT_BUCKET: &str = "assets";
pub const DEFAULT_PREFIX: &str = "uploads";

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
