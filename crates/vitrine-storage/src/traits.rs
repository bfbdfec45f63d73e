//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use vitrine_core::Credential;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// The backend answered with a non-success status
    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// HTTP status carried by the error, if the backend sent one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The write collided with an object already stored at the same path.
    pub fn is_conflict(&self) -> bool {
        match self {
            StorageError::Rejected { status: 409, .. } => true,
            StorageError::Rejected { message, .. } | StorageError::UploadFailed(message) => {
                let message = message.to_lowercase();
                message.contains("already exists") || message.contains("duplicate")
            }
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Acknowledgement of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Path inside the bucket
    pub path: String,
}

/// One object returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Name relative to the listed prefix
    pub name: String,
    /// Content type recorded at write time, when the backend keeps one
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

/// Outcome of an HTTP HEAD (or ranged GET) against a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Media type without parameters, lowercased
    pub content_type: Option<String>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Storage abstraction trait
///
/// All storage backends (HTTP object API, S3, local filesystem) implement this
/// trait so the pipeline can run against any of them, or against a mock in tests.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` at `path` inside `bucket`, recording `content_type`.
    ///
    /// The write is authorized with `credential`; backends that authenticate
    /// out of band ignore it.
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        credential: &Credential,
    ) -> StorageResult<StoredObject>;

    /// List objects under `prefix`, optionally narrowed to names containing `search`.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        search: Option<&str>,
    ) -> StorageResult<Vec<ObjectEntry>>;

    /// Issue a HEAD request against a URL served by this backend.
    async fn probe(&self, url: &str) -> StorageResult<ProbeResponse>;

    /// Time-limited read URL for an object
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    async fn delete(&self, bucket: &str, path: &str) -> StorageResult<()>;

    /// Public URL for an object. Pure; does not check the object exists.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_success_range() {
        let ok = ProbeResponse {
            status: 206,
            content_type: Some("image/png".to_string()),
        };
        assert!(ok.is_success());

        let denied = ProbeResponse {
            status: 400,
            content_type: Some("application/json".to_string()),
        };
        assert!(!denied.is_success());
    }

    #[test]
    fn test_status_only_for_rejections() {
        let err = StorageError::Rejected {
            status: 403,
            message: "new row violates row-level security policy".to_string(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(StorageError::Timeout("put".to_string()).status(), None);
    }

    #[test]
    fn test_duplicate_write_is_conflict() {
        let conflict = StorageError::Rejected {
            status: 409,
            message: "Conflict".to_string(),
        };
        assert!(conflict.is_conflict());

        // Some object APIs wrap the 409 in a 400 body
        let wrapped = StorageError::Rejected {
            status: 400,
            message: r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#
                .to_string(),
        };
        assert!(wrapped.is_conflict());

        let denied = StorageError::Rejected {
            status: 403,
            message: "new row violates row-level security policy".to_string(),
        };
        assert!(!denied.is_conflict());
        assert!(!StorageError::Timeout("put".to_string()).is_conflict());
    }
}
