//! Post-upload verification
//!
//! A write acknowledgement is not trusted on its own: the object is looked up
//! by listing its prefix, its recorded metadata is compared with what was sent,
//! and the public URL is probed. Critical corruption purges the object before
//! the report is returned.

use std::sync::Arc;
use std::time::Instant;

use vitrine_core::{CorruptionCause, CorruptionDiagnostic, Destination, VerificationReport};
use vitrine_storage::keys::split_path;
use vitrine_storage::{ObjectEntry, Storage};

use crate::config::VerifierConfig;
use crate::executor::with_timeout;

/// How an observed content type relates to the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTypeMatch {
    Exact,
    /// Alias or sibling subtype of the same media family
    Compatible,
    Mismatch,
}

impl ContentTypeMatch {
    pub fn is_acceptable(self) -> bool {
        self != ContentTypeMatch::Mismatch
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn canonical(content_type: &str) -> &str {
    match content_type {
        "image/jpg" | "image/pjpeg" => "image/jpeg",
        "image/x-png" => "image/png",
        "image/heif" => "image/heic",
        "audio/mp3" => "audio/mpeg",
        "audio/wave" | "audio/x-wav" => "audio/wav",
        "audio/x-m4a" => "audio/mp4",
        other => other,
    }
}

/// Compare a recorded or served content type with the one that was sent.
///
/// Structured-data and text types never pass as a media type: a JSON body where
/// an image was sent is the error-payload signature.
pub fn compare_content_types(expected: &str, observed: &str) -> ContentTypeMatch {
    let expected = essence(expected);
    let observed = essence(observed);
    if expected == observed {
        return ContentTypeMatch::Exact;
    }
    if canonical(&expected) == canonical(&observed) {
        return ContentTypeMatch::Compatible;
    }

    let family = |ct: &str| ct.split('/').next().map(str::to_string);
    match (family(&expected), family(&observed)) {
        (Some(a), Some(b)) if a == b && matches!(a.as_str(), "image" | "video" | "audio") => {
            ContentTypeMatch::Compatible
        }
        _ => ContentTypeMatch::Mismatch,
    }
}

pub struct Verifier {
    storage: Arc<dyn Storage>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(storage: Arc<dyn Storage>, config: VerifierConfig) -> Self {
        Self { storage, config }
    }

    /// Verify the object at `path` against what was sent.
    pub async fn verify(
        &self,
        destination: &Destination,
        path: &str,
        expected_content_type: &str,
        expected_size: u64,
    ) -> VerificationReport {
        let start = Instant::now();
        let bucket = destination.bucket.as_str();
        let mut report = VerificationReport {
            public_url: self.storage.public_url(bucket, path),
            size_matches: true,
            ..Default::default()
        };

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let entry = match self.find_entry(bucket, path, &mut report).await {
            Some(entry) => entry,
            None => {
                if report.lookup_error.is_none() {
                    // Listing worked every time and never showed the object.
                    let purged = self.purge(bucket, path).await;
                    report.corruption = Some(CorruptionDiagnostic {
                        stored_path: path.to_string(),
                        cause: CorruptionCause::MissingAfterUpload,
                        purged,
                    });
                }
                return report;
            }
        };
        report.object_found = true;

        let mut corruption =
            self.check_metadata(&entry, expected_content_type, expected_size, &mut report);

        if corruption.is_none() {
            corruption = self.check_public_url(expected_content_type, &mut report).await;
        }

        if let Some(cause) = corruption {
            tracing::error!(
                bucket = %bucket,
                key = %path,
                cause = %cause,
                "Stored object does not match upload, purging"
            );
            let purged = self.purge(bucket, path).await;
            report.corruption = Some(CorruptionDiagnostic {
                stored_path: path.to_string(),
                cause,
                purged,
            });
        }

        tracing::debug!(
            bucket = %bucket,
            key = %path,
            object_found = report.object_found,
            metadata_matches = report.metadata_content_type_matches,
            public_url_reachable = report.public_url_reachable,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Verification finished"
        );
        report
    }

    /// Delete a stored object. Returns whether the delete succeeded.
    pub async fn purge(&self, bucket: &str, path: &str) -> bool {
        match with_timeout(
            self.config.operation_timeout,
            "delete",
            self.storage.delete(bucket, path),
        )
        .await
        {
            Ok(()) => {
                tracing::info!(bucket = %bucket, key = %path, "Purged stored object");
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %path,
                    "Failed to purge stored object"
                );
                false
            }
        }
    }

    async fn find_entry(
        &self,
        bucket: &str,
        path: &str,
        report: &mut VerificationReport,
    ) -> Option<ObjectEntry> {
        let (prefix, name) = split_path(path);
        let attempts = self.config.list_attempts.max(1);
        let mut any_listing = false;
        let mut last_error = None;

        for attempt in 1..=attempts {
            report.list_attempts = attempt;
            let listed = with_timeout(
                self.config.operation_timeout,
                "list",
                self.storage.list(bucket, prefix, Some(name)),
            )
            .await;

            match listed {
                Ok(entries) => {
                    any_listing = true;
                    if let Some(entry) = entries.into_iter().find(|e| e.name == name) {
                        return Some(entry);
                    }
                    tracing::debug!(bucket = %bucket, key = %path, attempt, "Object not listed yet");
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        bucket = %bucket,
                        key = %path,
                        attempt,
                        "Listing failed during verification"
                    );
                    last_error = Some(e.to_string());
                }
            }

            if attempt < attempts && !self.config.list_retry_delay.is_zero() {
                tokio::time::sleep(self.config.list_retry_delay).await;
            }
        }

        if !any_listing {
            report.lookup_error = last_error;
        }
        None
    }

    fn check_metadata(
        &self,
        entry: &ObjectEntry,
        expected_content_type: &str,
        expected_size: u64,
        report: &mut VerificationReport,
    ) -> Option<CorruptionCause> {
        if let Some(observed) = entry.content_type.as_deref() {
            let verdict = compare_content_types(expected_content_type, observed);
            if verdict != ContentTypeMatch::Exact {
                report.observed_content_type = Some(observed.to_string());
            }
            if !verdict.is_acceptable() {
                return Some(CorruptionCause::ContentTypeMismatch {
                    expected: expected_content_type.to_string(),
                    observed: observed.to_string(),
                });
            }
            report.metadata_content_type_matches = true;
        }

        if let Some(observed) = entry.size {
            if observed != expected_size {
                report.size_matches = false;
                return Some(CorruptionCause::SizeMismatch {
                    expected: expected_size,
                    observed,
                });
            }
        }

        None
    }

    async fn check_public_url(
        &self,
        expected_content_type: &str,
        report: &mut VerificationReport,
    ) -> Option<CorruptionCause> {
        if !self.config.public_probe {
            report.public_url_reachable = report.metadata_content_type_matches;
            return None;
        }

        let probed = with_timeout(
            self.config.operation_timeout,
            "probe",
            self.storage.probe(&report.public_url),
        )
        .await;

        let response = match probed {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, url = %report.public_url, "Public URL probe failed");
                return None;
            }
        };

        if !response.is_success() {
            tracing::info!(
                url = %report.public_url,
                status = response.status,
                "Public URL not readable"
            );
            return None;
        }

        report.probe_content_type = response.content_type.clone();
        match response.content_type.as_deref() {
            Some(served) => {
                if !compare_content_types(expected_content_type, served).is_acceptable() {
                    return Some(CorruptionCause::ProbeContentTypeMismatch {
                        expected: expected_content_type.to_string(),
                        observed: served.to_string(),
                    });
                }
                report.metadata_content_type_matches = true;
                report.public_url_reachable = true;
            }
            // Reachable, but only trusted when metadata already vouched for the type.
            None => report.public_url_reachable = report.metadata_content_type_matches,
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_ignores_case_and_params() {
        assert_eq!(
            compare_content_types("image/png", "IMAGE/PNG; charset=binary"),
            ContentTypeMatch::Exact
        );
    }

    #[test]
    fn test_aliases_are_compatible() {
        assert_eq!(
            compare_content_types("image/jpeg", "image/jpg"),
            ContentTypeMatch::Compatible
        );
        assert_eq!(
            compare_content_types("audio/wav", "audio/x-wav"),
            ContentTypeMatch::Compatible
        );
    }

    #[test]
    fn test_same_media_family_is_tolerated() {
        assert_eq!(
            compare_content_types("image/png", "image/webp"),
            ContentTypeMatch::Compatible
        );
        assert_eq!(
            compare_content_types("video/mp4", "video/quicktime"),
            ContentTypeMatch::Compatible
        );
    }

    #[test]
    fn test_error_payload_types_are_mismatches() {
        assert_eq!(
            compare_content_types("image/png", "application/json"),
            ContentTypeMatch::Mismatch
        );
        assert_eq!(
            compare_content_types("application/pdf", "application/json"),
            ContentTypeMatch::Mismatch
        );
        assert_eq!(
            compare_content_types("video/mp4", "text/html"),
            ContentTypeMatch::Mismatch
        );
    }

    #[test]
    fn test_documents_need_exact_types() {
        assert_eq!(
            compare_content_types("text/plain", "text/csv"),
            ContentTypeMatch::Mismatch
        );
        assert!(!ContentTypeMatch::Mismatch.is_acceptable());
        assert!(ContentTypeMatch::Compatible.is_acceptable());
    }
}
