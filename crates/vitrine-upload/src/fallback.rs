//! Signed URL fallback for objects that are intact but not publicly readable.

use std::sync::Arc;
use std::time::Duration;

use vitrine_core::Destination;
use vitrine_storage::Storage;

use crate::executor::with_timeout;
use crate::verifier::compare_content_types;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// Signed URL issued and proven readable
    Resolved {
        url: String,
        content_type: Option<String>,
    },
    /// No usable signed URL; the object itself may still be fine
    Unreachable { reason: String },
    /// Signed URL serves something other than the asset
    Corrupted { url: String, observed: String },
}

impl FallbackOutcome {
    pub fn signed_url(&self) -> Option<&str> {
        match self {
            FallbackOutcome::Resolved { url, .. } => Some(url),
            _ => None,
        }
    }
}

pub struct FallbackResolver {
    storage: Arc<dyn Storage>,
    ttl: Duration,
    operation_timeout: Duration,
}

impl FallbackResolver {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration, operation_timeout: Duration) -> Self {
        Self {
            storage,
            ttl,
            operation_timeout,
        }
    }

    /// Issue a signed URL for `path` and probe it.
    ///
    /// `metadata_confirmed` says whether the stored metadata already vouched for
    /// the content type; without it the signed probe must report a type.
    pub async fn resolve(
        &self,
        destination: &Destination,
        path: &str,
        expected_content_type: &str,
        metadata_confirmed: bool,
    ) -> FallbackOutcome {
        let bucket = destination.bucket.as_str();
        let url = match with_timeout(
            self.operation_timeout,
            "sign",
            self.storage.create_signed_url(bucket, path, self.ttl),
        )
        .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, bucket = %bucket, key = %path, "Failed to create signed URL");
                return FallbackOutcome::Unreachable {
                    reason: format!("signed URL unavailable: {}", e),
                };
            }
        };

        let response = match with_timeout(self.operation_timeout, "probe", self.storage.probe(&url))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, bucket = %bucket, key = %path, "Signed URL probe failed");
                return FallbackOutcome::Unreachable {
                    reason: format!("signed URL probe failed: {}", e),
                };
            }
        };

        if !response.is_success() {
            return FallbackOutcome::Unreachable {
                reason: format!("signed URL answered with status {}", response.status),
            };
        }

        match response.content_type {
            Some(served) if !compare_content_types(expected_content_type, &served).is_acceptable() => {
                FallbackOutcome::Corrupted {
                    url,
                    observed: served,
                }
            }
            Some(served) => {
                tracing::info!(
                    bucket = %bucket,
                    key = %path,
                    ttl_secs = self.ttl.as_secs(),
                    "Public URL unreachable, using signed URL"
                );
                FallbackOutcome::Resolved {
                    url,
                    content_type: Some(served),
                }
            }
            None if metadata_confirmed => FallbackOutcome::Resolved {
                url,
                content_type: None,
            },
            None => FallbackOutcome::Unreachable {
                reason: "signed URL did not report a content type".to_string(),
            },
        }
    }
}
