//! Configuration module
//!
//! Environment-driven settings for the storage backend, per-file upload
//! defaults and the pipeline's retry/verification budgets.

use std::env;
use std::time::Duration;

use bytes::Bytes;

use crate::constants::{
    DEFAULT_BUCKET, DEFAULT_COMPRESSION_MAX_DIMENSION, DEFAULT_COMPRESSION_MAX_SIZE_KB,
    DEFAULT_LIST_ATTEMPTS, DEFAULT_LIST_RETRY_DELAY, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_MAX_RETRIES, DEFAULT_OPERATION_TIMEOUT, DEFAULT_PREFIX,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_SETTLE_DELAY, DEFAULT_SIGNED_URL_TTL,
};
use crate::error::AppError;
use crate::models::{
    CompressionPolicy, Destination, QualityPreset, UploadConstraints, UploadRequest,
};
use crate::storage_types::StorageBackend;

/// Backend selection and connection settings
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Base URL of the HTTP object API (e.g. `https://project.example.co/storage/v1`)
    pub storage_url: Option<String>,
    /// Key used for listing, signing and deleting on the HTTP backend
    pub service_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // S3-compatible providers (MinIO, R2, ...)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

/// Defaults applied to every file submitted without explicit settings
#[derive(Clone, Debug)]
pub struct UploadDefaults {
    pub bucket: String,
    pub prefix: String,
    pub max_file_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub compression_enabled: bool,
    pub compression_max_size_bytes: usize,
    pub compression_max_dimension: u32,
    pub compression_quality: QualityPreset,
    pub strip_metadata: bool,
}

/// Retry, timeout and verification budgets
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub operation_timeout: Duration,
    pub max_concurrency: usize,
    pub settle_delay: Duration,
    pub list_attempts: u32,
    pub list_retry_delay: Duration,
    pub public_probe: bool,
    pub signed_url_ttl: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            list_attempts: DEFAULT_LIST_ATTEMPTS,
            list_retry_delay: DEFAULT_LIST_RETRY_DELAY,
            public_probe: true,
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub storage: StorageSettings,
    pub upload: UploadDefaults,
    pub pipeline: PipelineSettings,
    /// Token handed to the static credential provider
    pub auth_token: Option<String>,
}

fn parse_list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| v.trim().to_lowercase())
        .and_then(|v| match v.as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the process environment (and `.env` when present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup. Missing or unparsable values fall back to defaults.
    pub fn from_lookup<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match var("STORAGE_BACKEND") {
            Some(value) => value
                .parse::<StorageBackend>()
                .map_err(|e| anyhow::anyhow!("STORAGE_BACKEND: {}", e))?,
            None => StorageBackend::Http,
        };

        let storage = StorageSettings {
            backend,
            storage_url: var("STORAGE_URL").map(|u| u.trim_end_matches('/').to_string()),
            service_key: var("STORAGE_SERVICE_KEY"),
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION"),
            s3_endpoint: var("S3_ENDPOINT"),
            aws_region: var("AWS_REGION"),
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL"),
        };

        let max_file_size_mb = var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|| DEFAULT_MAX_FILE_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);

        let compression_max_size_kb = var("COMPRESSION_MAX_SIZE_KB")
            .unwrap_or_else(|| DEFAULT_COMPRESSION_MAX_SIZE_KB.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_COMPRESSION_MAX_SIZE_KB);

        let compression_quality = match var("COMPRESSION_QUALITY") {
            Some(value) => QualityPreset::parse(&value)?,
            None => QualityPreset::Normal,
        };

        let upload = UploadDefaults {
            bucket: var("UPLOAD_BUCKET")
                .or_else(|| storage.s3_bucket.clone())
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            prefix: var("UPLOAD_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            allowed_extensions: parse_list(
                var("ALLOWED_EXTENSIONS").unwrap_or_else(|| "jpg,jpeg,png,gif,webp".to_string()),
            ),
            allowed_content_types: parse_list(
                var("ALLOWED_CONTENT_TYPES").unwrap_or_else(|| "image/".to_string()),
            ),
            compression_enabled: parse_bool(var("COMPRESSION_ENABLED"), true),
            compression_max_size_bytes: compression_max_size_kb * 1024,
            compression_max_dimension: var("COMPRESSION_MAX_DIMENSION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_COMPRESSION_MAX_DIMENSION),
            compression_quality,
            strip_metadata: parse_bool(var("STRIP_METADATA"), true),
        };

        let pipeline = PipelineSettings {
            max_retries: var("UPLOAD_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_base_delay: var("UPLOAD_RETRY_BASE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_BASE_DELAY),
            operation_timeout: var("UPLOAD_OPERATION_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_OPERATION_TIMEOUT),
            max_concurrency: var("UPLOAD_MAX_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            settle_delay: var("VERIFY_SETTLE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SETTLE_DELAY),
            list_attempts: var("VERIFY_LIST_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LIST_ATTEMPTS),
            list_retry_delay: var("VERIFY_LIST_RETRY_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LIST_RETRY_DELAY),
            public_probe: parse_bool(var("VERIFY_PUBLIC_PROBE"), true),
            signed_url_ttl: var("SIGNED_URL_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SIGNED_URL_TTL),
        };

        Ok(Config {
            storage,
            upload,
            pipeline,
            auth_token: var("AUTH_TOKEN").filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self.storage.backend {
            StorageBackend::Http => {
                if self.storage.storage_url.is_none() {
                    return Err(AppError::Config(
                        "STORAGE_URL must be set when using the http storage backend".to_string(),
                    ));
                }
            }
            StorageBackend::S3 => {
                if self.storage.s3_region.is_none() && self.storage.aws_region.is_none() {
                    return Err(AppError::Config(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                            .to_string(),
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(AppError::Config(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                            .to_string(),
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(AppError::Config(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                            .to_string(),
                    ));
                }
            }
        }

        if self.pipeline.max_concurrency == 0 {
            return Err(AppError::Config(
                "UPLOAD_MAX_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(AppError::Config(
                "ALLOWED_EXTENSIONS must list at least one extension".to_string(),
            ));
        }

        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.backend
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.storage
            .s3_region
            .as_deref()
            .or(self.storage.aws_region.as_deref())
    }

    pub fn destination(&self) -> Destination {
        Destination::new(self.upload.bucket.clone(), self.upload.prefix.clone())
    }

    pub fn constraints(&self) -> UploadConstraints {
        UploadConstraints {
            max_size_bytes: self.upload.max_file_size_bytes,
            allowed_extensions: self.upload.allowed_extensions.clone(),
            allowed_mime_prefixes: self.upload.allowed_content_types.clone(),
        }
    }

    pub fn compression_policy(&self) -> CompressionPolicy {
        CompressionPolicy {
            enabled: self.upload.compression_enabled,
            max_size_bytes: self.upload.compression_max_size_bytes,
            max_dimension: self.upload.compression_max_dimension,
            quality: self.upload.compression_quality,
            strip_metadata: self.upload.strip_metadata,
        }
    }

    /// Request carrying every configured default for `destination`.
    pub fn upload_request(
        &self,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        destination: Destination,
    ) -> UploadRequest {
        UploadRequest::new(file_name, data, destination)
            .with_constraints(self.constraints())
            .with_compression(self.compression_policy())
            .with_retry(self.pipeline.max_retries, self.pipeline.retry_base_delay)
    }
}
