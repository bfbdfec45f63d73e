use anyhow::{anyhow, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::verification::VerificationReport;
use crate::constants::{
    DEFAULT_BUCKET, DEFAULT_COMPRESSION_MAX_DIMENSION, DEFAULT_COMPRESSION_MAX_SIZE_KB,
    DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_MAX_RETRIES, DEFAULT_PREFIX, DEFAULT_RETRY_BASE_DELAY,
};

/// Where an asset is written: bucket plus a path prefix inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub bucket: String,
    pub prefix: String,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET, DEFAULT_PREFIX)
    }
}

/// Size and type limits checked before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConstraints {
    pub max_size_bytes: usize,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    /// MIME prefixes such as `image/` or `application/pdf`
    pub allowed_mime_prefixes: Vec<String>,
}

impl Default for UploadConstraints {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            allowed_extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_mime_prefixes: vec!["image/".to_string()],
        }
    }
}

/// Quality presets for image compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    Normal, // Default quality, balanced size and quality
    Better,   // Higher quality, larger files
    Lighter,  // Smaller files
    Lightest, // Maximum compression
}

impl QualityPreset {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(QualityPreset::Normal),
            "better" => Ok(QualityPreset::Better),
            "lighter" => Ok(QualityPreset::Lighter),
            "lightest" => Ok(QualityPreset::Lightest),
            _ => Err(anyhow!("Invalid quality preset: {}", s)),
        }
    }

    /// Get quality value for JPEG (0-100)
    pub fn jpeg_quality(self) -> u8 {
        match self {
            QualityPreset::Normal => 80,
            QualityPreset::Better => 90,
            QualityPreset::Lighter => 70,
            QualityPreset::Lightest => 55,
        }
    }

    /// Get quality value for WebP (0-100)
    pub fn webp_quality(self) -> f32 {
        match self {
            QualityPreset::Normal => 80.0,
            QualityPreset::Better => 90.0,
            QualityPreset::Lighter => 70.0,
            QualityPreset::Lightest => 55.0,
        }
    }
}

/// How image payloads are shrunk before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionPolicy {
    pub enabled: bool,
    /// Target upper bound for the encoded payload
    pub max_size_bytes: usize,
    /// Longer edge in pixels
    pub max_dimension: u32,
    pub quality: QualityPreset,
    /// Drop EXIF from images that are passed through unchanged
    pub strip_metadata: bool,
}

impl CompressionPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_bytes: DEFAULT_COMPRESSION_MAX_SIZE_KB * 1024,
            max_dimension: DEFAULT_COMPRESSION_MAX_DIMENSION,
            quality: QualityPreset::Normal,
            strip_metadata: true,
        }
    }
}

/// One file entering the pipeline. Never mutated after creation.
#[derive(Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    pub file_name: String,
    /// MIME type claimed by the caller; only a hint
    pub declared_content_type: Option<String>,
    pub destination: Destination,
    pub constraints: UploadConstraints,
    pub compression: CompressionPolicy,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>, destination: Destination) -> Self {
        Self {
            data: data.into(),
            file_name: file_name.into(),
            declared_content_type: None,
            destination,
            constraints: UploadConstraints::default(),
            compression: CompressionPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_declared_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.declared_content_type = Some(content_type.into());
        self
    }

    pub fn with_constraints(mut self, constraints: UploadConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Lowercased extension of the declared filename.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("file_name", &self.file_name)
            .field("size_bytes", &self.data.len())
            .field("declared_content_type", &self.declared_content_type)
            .field("destination", &self.destination)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Payload ready for the network: possibly compressed, with a corrected content type.
#[derive(Clone)]
pub struct PreparedAsset {
    pub data: Bytes,
    pub content_type: String,
    pub original_file_name: String,
    pub original_size: usize,
    pub compressed: bool,
    pub warnings: Vec<String>,
}

impl PreparedAsset {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for PreparedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedAsset")
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.data.len())
            .field("original_size", &self.original_size)
            .field("compressed", &self.compressed)
            .finish()
    }
}

/// Terminal success for one file.
///
/// Only built after verification found the object and either the public URL
/// or a signed URL was proven readable.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub original_file_name: String,
    pub bucket: String,
    pub stored_path: String,
    pub public_url: String,
    pub fallback_url: Option<String>,
    pub content_type: String,
    pub size_bytes: u64,
    pub original_size_bytes: u64,
    pub attempts: u32,
    pub warnings: Vec<String>,
    pub verification: VerificationReport,
}

impl UploadResult {
    /// URL the caller should hand out: the signed fallback when the public one is unreachable.
    pub fn access_url(&self) -> &str {
        match (&self.fallback_url, self.verification.public_url_reachable) {
            (Some(url), false) => url,
            _ => &self.public_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_preset_parse() {
        assert_eq!(QualityPreset::parse("normal").unwrap(), QualityPreset::Normal);
        assert_eq!(QualityPreset::parse("BETTER").unwrap(), QualityPreset::Better);
        assert_eq!(QualityPreset::parse("lightest").unwrap(), QualityPreset::Lightest);
        assert!(QualityPreset::parse("invalid").is_err());
    }

    #[test]
    fn test_quality_ordering() {
        assert!(QualityPreset::Better.jpeg_quality() > QualityPreset::Normal.jpeg_quality());
        assert!(QualityPreset::Lightest.webp_quality() < QualityPreset::Lighter.webp_quality());
    }

    #[test]
    fn test_request_extension_is_lowercased() {
        let request = UploadRequest::new("Photo.JPG", vec![1, 2, 3], Destination::default());
        assert_eq!(request.extension().as_deref(), Some("jpg"));
        assert_eq!(request.size(), 3);

        let request = UploadRequest::new("README", vec![], Destination::default());
        assert_eq!(request.extension(), None);
    }

    #[test]
    fn test_request_debug_omits_payload() {
        let request = UploadRequest::new("a.png", vec![0xAB; 64], Destination::default());
        let debug = format!("{:?}", request);
        assert!(debug.contains("size_bytes: 64"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_disabled_compression_keeps_limits() {
        let policy = CompressionPolicy::disabled();
        assert!(!policy.enabled);
        assert_eq!(policy.max_dimension, DEFAULT_COMPRESSION_MAX_DIMENSION);
    }
}
