//! Upload pipeline domain models.

pub mod outcome;
pub mod upload;
pub mod verification;

pub use outcome::{
    BatchResult, BatchStatus, ClassifiedError, CorruptionCause, CorruptionDiagnostic, Decision,
    ErrorKind, FailedUpload,
};
pub use upload::{
    CompressionPolicy, Destination, PreparedAsset, QualityPreset, UploadConstraints,
    UploadRequest, UploadResult,
};
pub use verification::VerificationReport;
