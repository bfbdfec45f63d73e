//! Error taxonomy and terminal outcomes of the pipeline.

use serde::Serialize;
use std::fmt;

use super::upload::{UploadRequest, UploadResult};
use crate::error::{ErrorMetadata, LogLevel};

/// Classification of every failure the pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Size/type rejected before upload
    Validation,
    /// Network or timeout trouble during transport
    Transient,
    /// Backend refused the write on policy grounds, or no credential exists
    AccessDenied,
    /// The stored object is not the asset that was sent
    Corruption,
    /// Upload acknowledged but the object cannot be located
    NotFound,
    /// Caller cancelled the batch before this file finished
    Cancelled,
}

/// What the pipeline does after a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    PurgeAndAbort,
    Abort,
    Fallback,
}

impl ErrorKind {
    pub fn decision(self) -> Decision {
        match self {
            ErrorKind::Transient | ErrorKind::NotFound => Decision::Retry,
            ErrorKind::Corruption => Decision::PurgeAndAbort,
            ErrorKind::Validation | ErrorKind::AccessDenied | ErrorKind::Cancelled => {
                Decision::Abort
            }
        }
    }

    pub fn is_retryable(self) -> bool {
        self.decision() == Decision::Retry
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Corruption => "corruption",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stored object was judged corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum CorruptionCause {
    /// Recorded metadata content type disagrees with what was sent
    ContentTypeMismatch { expected: String, observed: String },
    /// Recorded size disagrees with the uploaded payload
    SizeMismatch { expected: u64, observed: u64 },
    /// Public URL served a different content type
    ProbeContentTypeMismatch { expected: String, observed: String },
    /// Signed URL served a different content type
    SignedProbeContentTypeMismatch { expected: String, observed: String },
    /// Never became visible within the verification budget
    MissingAfterUpload,
}

impl fmt::Display for CorruptionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionCause::ContentTypeMismatch { expected, observed } => write!(
                f,
                "stored metadata reports {} where {} was sent",
                observed, expected
            ),
            CorruptionCause::SizeMismatch { expected, observed } => write!(
                f,
                "stored size is {} bytes where {} bytes were sent",
                observed, expected
            ),
            CorruptionCause::ProbeContentTypeMismatch { expected, observed } => write!(
                f,
                "public URL serves {} where {} was sent",
                observed, expected
            ),
            CorruptionCause::SignedProbeContentTypeMismatch { expected, observed } => write!(
                f,
                "signed URL serves {} where {} was sent",
                observed, expected
            ),
            CorruptionCause::MissingAfterUpload => {
                write!(f, "object not visible after upload was acknowledged")
            }
        }
    }
}

/// Diagnostic payload carried by `Corruption` failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionDiagnostic {
    pub stored_path: String,
    #[serde(flatten)]
    pub cause: CorruptionCause,
    /// Whether the object was deleted from the backend
    pub purged: bool,
}

/// Terminal failure of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{file_name}: {reason}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub file_name: String,
    pub reason: String,
    /// Last underlying cause (backend message, network error)
    pub cause: Option<String>,
    /// Upload attempts made before giving up
    pub attempts: u32,
    /// Path of an object that was written but never verified
    pub orphaned_path: Option<String>,
    pub diagnostic: Option<CorruptionDiagnostic>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            file_name: file_name.into(),
            reason: reason.into(),
            cause: None,
            attempts: 0,
            orphaned_path: None,
            diagnostic: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_orphaned_path(mut self, path: impl Into<String>) -> Self {
        self.orphaned_path = Some(path.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: CorruptionDiagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn cancelled(file_name: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, file_name, "Upload cancelled")
    }
}

impl ErrorMetadata for ClassifiedError {
    fn http_status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::Validation => 422,
            ErrorKind::Transient => 503,
            ErrorKind::AccessDenied => 403,
            ErrorKind::Corruption => 502,
            ErrorKind::NotFound => 404,
            ErrorKind::Cancelled => 499,
        }
    }

    fn error_code(&self) -> &'static str {
        match self.kind {
            ErrorKind::Validation => "VALIDATION_FAILED",
            ErrorKind::Transient => "TRANSIENT_FAILURE",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::Corruption => "STORED_OBJECT_CORRUPTED",
            ErrorKind::NotFound => "OBJECT_NOT_FOUND",
            ErrorKind::Cancelled => "UPLOAD_CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transient | ErrorKind::NotFound | ErrorKind::Cancelled
        )
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::Validation => Some("Choose a smaller file or a supported type"),
            ErrorKind::Transient => Some("Try again later"),
            ErrorKind::AccessDenied => {
                Some("Check the bucket access policy and sign-in state; retrying will not help")
            }
            ErrorKind::Corruption => {
                Some("The storage configuration must be fixed before this upload can succeed")
            }
            ErrorKind::NotFound => Some("Try again later"),
            ErrorKind::Cancelled => Some("Re-submit the file"),
        }
    }

    fn client_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => self.reason.clone(),
            ErrorKind::Transient => format!(
                "Upload of {} failed after {} attempt(s); try again later",
                self.file_name, self.attempts
            ),
            ErrorKind::AccessDenied => format!("Upload of {} was refused", self.file_name),
            ErrorKind::Corruption => format!(
                "Storage kept an invalid copy of {}; it was removed",
                self.file_name
            ),
            ErrorKind::NotFound => format!("{} could not be found after upload", self.file_name),
            ErrorKind::Cancelled => format!("Upload of {} was cancelled", self.file_name),
        }
    }

    fn is_sensitive(&self) -> bool {
        false
    }

    fn log_level(&self) -> LogLevel {
        match self.kind {
            ErrorKind::Validation | ErrorKind::Cancelled => LogLevel::Debug,
            ErrorKind::Transient | ErrorKind::NotFound | ErrorKind::AccessDenied => LogLevel::Warn,
            ErrorKind::Corruption => LogLevel::Error,
        }
    }
}

/// A file that did not make it, with the request kept for re-submission.
#[derive(Debug, Clone)]
pub struct FailedUpload {
    pub request: UploadRequest,
    pub error: ClassifiedError,
}

/// Overall shape of a batch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Empty,
    AllSucceeded,
    Partial,
    AllFailed,
}

/// Every input file ends up in exactly one of the two lists.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub succeeded: Vec<UploadResult>,
    pub failed: Vec<FailedUpload>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn status(&self) -> BatchStatus {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (true, true) => BatchStatus::Empty,
            (false, true) => BatchStatus::AllSucceeded,
            (false, false) => BatchStatus::Partial,
            (true, false) => BatchStatus::AllFailed,
        }
    }

    pub fn is_total_failure(&self) -> bool {
        self.status() == BatchStatus::AllFailed
    }

    /// Requests to re-submit: only the failed subset.
    pub fn failed_requests(&self) -> Vec<UploadRequest> {
        self.failed.iter().map(|f| f.request.clone()).collect()
    }
}
