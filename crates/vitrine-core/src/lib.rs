//! Vitrine Core Library
//!
//! This crate provides the domain models, error types, configuration and the
//! credential collaborator shared by every crate of the asset upload pipeline.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use auth::{
    Credential, CredentialProvider, NoCredentialProvider, StaticCredentialProvider,
    Unauthenticated,
};
pub use config::{Config, PipelineSettings, StorageSettings, UploadDefaults};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    BatchResult, BatchStatus, ClassifiedError, CompressionPolicy, CorruptionCause,
    CorruptionDiagnostic, Decision, Destination, ErrorKind, FailedUpload, PreparedAsset,
    QualityPreset, UploadConstraints, UploadRequest, UploadResult, VerificationReport,
};
pub use storage_types::StorageBackend;
