//! Per-file pipeline: validate → compress → upload → verify → fallback.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use vitrine_core::{
    ClassifiedError, CorruptionCause, CorruptionDiagnostic, CredentialProvider, Decision,
    ErrorKind, ErrorMetadata, LogLevel, PreparedAsset, UploadRequest, UploadResult,
    VerificationReport,
};
use vitrine_processing::compress;
use vitrine_storage::keys::{generate_object_name, object_path};
use vitrine_storage::Storage;

use crate::classifier::verification_decision;
use crate::config::{PipelineConfig, RetryPolicy};
use crate::executor::{UploadExecutor, UploadOutcome};
use crate::fallback::{FallbackOutcome, FallbackResolver};
use crate::progress::{FileReporter, ProgressTracker, Stage};
use crate::verifier::Verifier;

pub struct UploadPipeline {
    executor: UploadExecutor,
    verifier: Verifier,
    fallback: FallbackResolver,
    config: PipelineConfig,
}

impl UploadPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        credentials: Arc<dyn CredentialProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            executor: UploadExecutor::new(
                storage.clone(),
                credentials,
                config.operation_timeout,
            ),
            verifier: Verifier::new(storage.clone(), config.verifier.clone()),
            fallback: FallbackResolver::new(
                storage,
                config.signed_url_ttl,
                config.operation_timeout,
            ),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate a request without touching the network. Returns the corrected content type.
    pub fn validate(&self, request: &UploadRequest) -> Result<String, ClassifiedError> {
        vitrine_processing::validate(request).map_err(|e| e.classify(&request.file_name))
    }

    /// Run one file through the pipeline without progress reporting.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, ClassifiedError> {
        let reporter = ProgressTracker::detached().reporter(0, request.file_name.clone());
        self.process(request, &reporter, &CancellationToken::new())
            .await
    }

    /// Run one file through the pipeline.
    ///
    /// Returns success only once the object was found and a readable URL
    /// (public or signed) was proven.
    pub async fn process(
        &self,
        request: &UploadRequest,
        reporter: &FileReporter,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, ClassifiedError> {
        let start = Instant::now();
        let result = self.run(request, reporter, cancel).await;

        match &result {
            Ok(uploaded) => {
                reporter.stage(Stage::Done);
                tracing::info!(
                    file_name = %request.file_name,
                    bucket = %uploaded.bucket,
                    key = %uploaded.stored_path,
                    size_bytes = uploaded.size_bytes,
                    fallback = uploaded.fallback_url.is_some(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload verified"
                );
            }
            Err(error) => {
                reporter.stage(Stage::Failed);
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                let code = error.error_code();
                match error.log_level() {
                    LogLevel::Debug => tracing::debug!(
                        file_name = %request.file_name,
                        error_code = code,
                        reason = %error.reason,
                        duration_ms,
                        "Upload rejected"
                    ),
                    LogLevel::Warn => tracing::warn!(
                        file_name = %request.file_name,
                        error_code = code,
                        reason = %error.reason,
                        attempts = error.attempts,
                        cause = ?error.cause,
                        duration_ms,
                        "Upload failed"
                    ),
                    LogLevel::Error => tracing::error!(
                        file_name = %request.file_name,
                        error_code = code,
                        reason = %error.reason,
                        attempts = error.attempts,
                        diagnostic = ?error.diagnostic,
                        duration_ms,
                        "Upload failed"
                    ),
                }
            }
        }
        result
    }

    async fn run(
        &self,
        request: &UploadRequest,
        reporter: &FileReporter,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, ClassifiedError> {
        let file_name = request.file_name.as_str();
        if cancel.is_cancelled() {
            return Err(ClassifiedError::cancelled(file_name));
        }

        reporter.stage(Stage::Validating);
        let content_type = self.validate(request)?;

        reporter.stage(Stage::Compressing);
        let asset = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClassifiedError::cancelled(file_name)),
            asset = compress(request, &content_type) => asset,
        };
        for warning in &asset.warnings {
            tracing::warn!(file_name = %file_name, warning = %warning, "Compression warning");
        }

        let path = object_path(
            &request.destination.prefix,
            &generate_object_name(file_name),
        );
        let outcome = self
            .executor
            .upload_with_retry(
                &asset,
                &request.destination,
                &path,
                RetryPolicy::from_request(request),
                reporter,
                cancel,
            )
            .await?;

        reporter.stage(Stage::Verifying);
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(orphaned(file_name, &outcome)),
            report = self.verifier.verify(
                &request.destination,
                &outcome.stored_path,
                &asset.content_type,
                asset.size() as u64,
            ) => report,
        };

        match verification_decision(&report) {
            None => Ok(build_result(request, asset, &outcome, report, None)),
            Some(Decision::PurgeAndAbort) => {
                let diagnostic = report.corruption.clone().unwrap_or(CorruptionDiagnostic {
                    stored_path: outcome.stored_path.clone(),
                    cause: CorruptionCause::MissingAfterUpload,
                    purged: false,
                });
                Err(corruption_error(file_name, &outcome, diagnostic))
            }
            Some(Decision::Fallback) => {
                reporter.stage(Stage::ResolvingFallback);
                let resolved = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(orphaned(file_name, &outcome)),
                    resolved = self.fallback.resolve(
                        &request.destination,
                        &outcome.stored_path,
                        &asset.content_type,
                        report.metadata_content_type_matches,
                    ) => resolved,
                };
                self.settle_fallback(request, asset, &outcome, report, resolved)
                    .await
            }
            Some(Decision::Retry) | Some(Decision::Abort) => {
                // Every listing failed: the object may exist, nobody can tell.
                let mut error = ClassifiedError::new(
                    ErrorKind::Transient,
                    file_name,
                    "Could not confirm the upload",
                )
                .with_attempts(outcome.attempts)
                .with_orphaned_path(&outcome.stored_path);
                if let Some(cause) = report.lookup_error {
                    error = error.with_cause(cause);
                }
                Err(error)
            }
        }
    }

    async fn settle_fallback(
        &self,
        request: &UploadRequest,
        asset: PreparedAsset,
        outcome: &UploadOutcome,
        mut report: VerificationReport,
        resolved: FallbackOutcome,
    ) -> Result<UploadResult, ClassifiedError> {
        let file_name = request.file_name.as_str();
        match resolved {
            FallbackOutcome::Resolved { url, content_type } => {
                if content_type.is_some() {
                    report.metadata_content_type_matches = true;
                }
                Ok(build_result(request, asset, outcome, report, Some(url)))
            }
            FallbackOutcome::Unreachable { reason } => Err(ClassifiedError::new(
                ErrorKind::AccessDenied,
                file_name,
                "Stored object is not readable through any URL",
            )
            .with_cause(reason)
            .with_attempts(outcome.attempts)
            .with_orphaned_path(&outcome.stored_path)),
            FallbackOutcome::Corrupted { observed, .. } => {
                let purged = self
                    .verifier
                    .purge(&request.destination.bucket, &outcome.stored_path)
                    .await;
                let diagnostic = CorruptionDiagnostic {
                    stored_path: outcome.stored_path.clone(),
                    cause: CorruptionCause::SignedProbeContentTypeMismatch {
                        expected: asset.content_type.clone(),
                        observed,
                    },
                    purged,
                };
                Err(corruption_error(file_name, outcome, diagnostic))
            }
        }
    }
}

fn build_result(
    request: &UploadRequest,
    asset: PreparedAsset,
    outcome: &UploadOutcome,
    report: VerificationReport,
    fallback_url: Option<String>,
) -> UploadResult {
    UploadResult {
        original_file_name: request.file_name.clone(),
        bucket: request.destination.bucket.clone(),
        stored_path: outcome.stored_path.clone(),
        public_url: report.public_url.clone(),
        fallback_url,
        size_bytes: asset.size() as u64,
        original_size_bytes: request.size() as u64,
        content_type: asset.content_type,
        attempts: outcome.attempts,
        warnings: asset.warnings,
        verification: report,
    }
}

fn corruption_error(
    file_name: &str,
    outcome: &UploadOutcome,
    diagnostic: CorruptionDiagnostic,
) -> ClassifiedError {
    let mut error = ClassifiedError::new(
        ErrorKind::Corruption,
        file_name,
        format!("Stored object is corrupted: {}", diagnostic.cause),
    )
    .with_attempts(outcome.attempts);
    if !diagnostic.purged {
        error = error.with_orphaned_path(&diagnostic.stored_path);
    }
    error.with_diagnostic(diagnostic)
}

fn orphaned(file_name: &str, outcome: &UploadOutcome) -> ClassifiedError {
    ClassifiedError::cancelled(file_name)
        .with_attempts(outcome.attempts)
        .with_orphaned_path(&outcome.stored_path)
}
