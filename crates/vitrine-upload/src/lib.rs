//! Vitrine upload pipeline
//!
//! Validate, compress, upload with retry, verify, and fall back to a signed URL
//! when the public one does not serve the object. [`BatchCoordinator`] runs the
//! per-file [`UploadPipeline`] over many files with bounded concurrency.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod executor;
pub mod fallback;
pub mod pipeline;
pub mod progress;
pub mod verifier;

pub use batch::BatchCoordinator;
pub use classifier::{
    classify_message, classify_status, classify_storage_error, verification_decision,
};
pub use config::{PipelineConfig, RetryPolicy, VerifierConfig};
pub use executor::{UploadExecutor, UploadOutcome};
pub use fallback::{FallbackOutcome, FallbackResolver};
pub use pipeline::UploadPipeline;
pub use progress::{
    BatchProgress, FileProgress, FileReporter, ProgressCallback, ProgressTracker, Stage,
};
pub use verifier::{compare_content_types, ContentTypeMatch, Verifier};
