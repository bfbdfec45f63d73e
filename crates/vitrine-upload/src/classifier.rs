//! Error classification
//!
//! Pure mapping from structured failures to an [`ErrorKind`]. HTTP status codes
//! decide first; message keywords are only consulted when the status alone is
//! ambiguous or missing.

use vitrine_core::{Decision, ErrorKind, VerificationReport};
use vitrine_storage::StorageError;

/// Substrings that mark a backend rejection as a policy decision.
const ACCESS_KEYWORDS: &[&str] = &[
    "policy",
    "permission",
    "row-level security",
    "unauthorized",
    "forbidden",
    "access denied",
    "not allowed",
    "jwt",
    "signature",
];

/// Classify a failed storage call made while writing an object.
pub fn classify_storage_error(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::Rejected { status, message } => classify_status(*status, message),
        StorageError::Network(_) | StorageError::Timeout(_) => ErrorKind::Transient,
        StorageError::IoError(_) => ErrorKind::Transient,
        // The bucket or the path's parent is missing; no retry can create it.
        StorageError::NotFound(_) | StorageError::ConfigError(_) => ErrorKind::AccessDenied,
        StorageError::InvalidKey(_) => ErrorKind::Validation,
        StorageError::UploadFailed(message)
        | StorageError::DeleteFailed(message)
        | StorageError::BackendError(message) => {
            classify_message(message).unwrap_or(ErrorKind::Transient)
        }
    }
}

/// Classify a non-success HTTP status and its body message.
pub fn classify_status(status: u16, message: &str) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AccessDenied,
        408 | 425 | 429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        400..=499 => classify_message(message).unwrap_or(ErrorKind::Validation),
        _ => classify_message(message).unwrap_or(ErrorKind::Transient),
    }
}

/// Keyword heuristic over a backend error message.
pub fn classify_message(message: &str) -> Option<ErrorKind> {
    let lower = message.to_lowercase();
    if ACCESS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some(ErrorKind::AccessDenied);
    }
    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("connection") {
        return Some(ErrorKind::Transient);
    }
    None
}

/// What to do after verification. `None` means the upload is proven readable.
pub fn verification_decision(report: &VerificationReport) -> Option<Decision> {
    if report.is_corrupted() {
        Some(Decision::PurgeAndAbort)
    } else if !report.object_found {
        Some(ErrorKind::NotFound.decision())
    } else if report.needs_fallback() {
        Some(Decision::Fallback)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::{CorruptionCause, CorruptionDiagnostic};

    fn rejected(status: u16, message: &str) -> StorageError {
        StorageError::Rejected {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_auth_statuses_are_access_denied() {
        assert_eq!(classify_storage_error(&rejected(401, "")), ErrorKind::AccessDenied);
        assert_eq!(classify_storage_error(&rejected(403, "")), ErrorKind::AccessDenied);
    }

    #[test]
    fn test_server_and_throttle_statuses_are_transient() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert_eq!(
                classify_storage_error(&rejected(status, "try later")),
                ErrorKind::Transient,
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_policy_message_on_bad_request() {
        let err = rejected(400, "new row violates row-level security policy");
        assert_eq!(classify_storage_error(&err), ErrorKind::AccessDenied);
    }

    #[test]
    fn test_plain_client_error_is_validation() {
        assert_eq!(
            classify_storage_error(&rejected(413, "Payload too large")),
            ErrorKind::Validation
        );
        assert_eq!(
            classify_storage_error(&rejected(415, "invalid mime type")),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_transport_failures_are_transient() {
        assert_eq!(
            classify_storage_error(&StorageError::Network("connection reset".into())),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_storage_error(&StorageError::Timeout("put".into())),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_unstructured_messages_fall_back_to_keywords() {
        assert_eq!(
            classify_storage_error(&StorageError::BackendError("Permission denied".into())),
            ErrorKind::AccessDenied
        );
        assert_eq!(
            classify_storage_error(&StorageError::UploadFailed("something odd".into())),
            ErrorKind::Transient
        );
        assert_eq!(classify_message("bucket exists"), None);
    }

    #[test]
    fn test_invalid_key_is_validation() {
        assert_eq!(
            classify_storage_error(&StorageError::InvalidKey("..".into())),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_verification_decisions() {
        let intact = VerificationReport {
            object_found: true,
            metadata_content_type_matches: true,
            size_matches: true,
            public_url_reachable: true,
            ..Default::default()
        };
        assert_eq!(verification_decision(&intact), None);

        let unreachable = VerificationReport {
            public_url_reachable: false,
            ..intact.clone()
        };
        assert_eq!(verification_decision(&unreachable), Some(Decision::Fallback));

        let missing = VerificationReport::default();
        assert_eq!(verification_decision(&missing), Some(Decision::Retry));

        let corrupted = VerificationReport {
            corruption: Some(CorruptionDiagnostic {
                stored_path: "uploads/a.png".into(),
                cause: CorruptionCause::ContentTypeMismatch {
                    expected: "image/png".into(),
                    observed: "application/json".into(),
                },
                purged: true,
            }),
            ..intact
        };
        assert_eq!(verification_decision(&corrupted), Some(Decision::PurgeAndAbort));
    }
}
