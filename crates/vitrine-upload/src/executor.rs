//! Upload executor
//!
//! One attempt is a single `put` with the corrected content type sent explicitly,
//! bounded by the operation timeout. The retry loop around it fetches a fresh
//! credential per attempt, backs off linearly and stops early on failures the
//! classifier marks as non-retryable.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use vitrine_core::{
    ClassifiedError, Credential, CredentialProvider, Destination, ErrorKind, PreparedAsset,
};
use vitrine_storage::{Storage, StorageError, StorageResult, StoredObject};

use crate::classifier::classify_storage_error;
use crate::config::RetryPolicy;
use crate::progress::FileReporter;

/// Run a storage call with an upper bound on its duration.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, operation: &str, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(format!(
            "{} did not complete within {}ms",
            operation,
            timeout.as_millis()
        ))),
    }
}

/// Acknowledged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub stored_path: String,
    /// Attempts spent, the successful one included
    pub attempts: u32,
}

pub struct UploadExecutor {
    storage: Arc<dyn Storage>,
    credentials: Arc<dyn CredentialProvider>,
    operation_timeout: Duration,
}

impl UploadExecutor {
    pub fn new(
        storage: Arc<dyn Storage>,
        credentials: Arc<dyn CredentialProvider>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            credentials,
            operation_timeout,
        }
    }

    async fn put_once(
        &self,
        asset: &PreparedAsset,
        destination: &Destination,
        path: &str,
        credential: &Credential,
    ) -> StorageResult<StoredObject> {
        let start = Instant::now();
        let stored = with_timeout(
            self.operation_timeout,
            "put",
            self.storage.put(
                &destination.bucket,
                path,
                asset.data.clone(),
                &asset.content_type,
                credential,
            ),
        )
        .await?;

        tracing::debug!(
            bucket = %destination.bucket,
            key = %stored.path,
            size_bytes = asset.size(),
            content_type = %asset.content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Put acknowledged"
        );
        Ok(stored)
    }

    /// One network write. Failures come back already classified.
    pub async fn upload(
        &self,
        asset: &PreparedAsset,
        destination: &Destination,
        path: &str,
        credential: &Credential,
    ) -> Result<StoredObject, ClassifiedError> {
        self.put_once(asset, destination, path, credential)
            .await
            .map_err(|e| classify_put_error(&asset.original_file_name, &e))
    }

    /// Upload with bounded linear backoff.
    ///
    /// Every attempt writes to the same `path`. A put that timed out may still
    /// have landed, so from then on a conflict on that path counts as stored
    /// (verification checks what is there), and any terminal failure reports
    /// the path as orphaned. Cancellation is honoured before each attempt,
    /// during the put and during backoff.
    pub async fn upload_with_retry(
        &self,
        asset: &PreparedAsset,
        destination: &Destination,
        path: &str,
        policy: RetryPolicy,
        reporter: &FileReporter,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, ClassifiedError> {
        let file_name = asset.original_file_name.as_str();
        let mut attempt = 0;
        let mut may_have_landed = false;

        let settle = |error: ClassifiedError, may_have_landed: bool| {
            if may_have_landed {
                error.with_orphaned_path(path)
            } else {
                error
            }
        };

        loop {
            if cancel.is_cancelled() {
                return Err(settle(
                    ClassifiedError::cancelled(file_name).with_attempts(attempt),
                    may_have_landed,
                ));
            }
            attempt += 1;

            let credential = match self.credentials.current_credential().await {
                Ok(credential) => credential,
                Err(e) => {
                    tracing::warn!(
                        file_name = %file_name,
                        error = %e,
                        "No credential available, refusing to upload"
                    );
                    let error = ClassifiedError::new(
                        ErrorKind::AccessDenied,
                        file_name,
                        "Not authenticated",
                    )
                    .with_cause(e.to_string())
                    .with_attempts(attempt - 1);
                    return Err(settle(error, may_have_landed));
                }
            };

            reporter.attempt(attempt, policy.max_attempts);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        file_name = %file_name,
                        key = %path,
                        attempt,
                        "Upload cancelled mid-flight, object left orphaned"
                    );
                    return Err(ClassifiedError::cancelled(file_name)
                        .with_attempts(attempt)
                        .with_orphaned_path(path));
                }
                result = self.put_once(asset, destination, path, &credential) => result,
            };

            let storage_error = match result {
                Ok(stored) => {
                    tracing::info!(
                        bucket = %destination.bucket,
                        key = %stored.path,
                        size_bytes = asset.size(),
                        attempt,
                        "File uploaded"
                    );
                    return Ok(UploadOutcome {
                        stored_path: stored.path,
                        attempts: attempt,
                    });
                }
                Err(e) if may_have_landed && e.is_conflict() => {
                    tracing::info!(
                        bucket = %destination.bucket,
                        key = %path,
                        attempt,
                        "Object from a timed-out attempt is already stored"
                    );
                    return Ok(UploadOutcome {
                        stored_path: path.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if matches!(storage_error, StorageError::Timeout(_)) {
                may_have_landed = true;
            }
            let error = classify_put_error(file_name, &storage_error).with_attempts(attempt);

            if !error.kind.is_retryable() {
                tracing::warn!(
                    file_name = %file_name,
                    kind = %error.kind,
                    attempt,
                    error = ?error.cause,
                    "Upload failed, not retryable"
                );
                return Err(settle(error, may_have_landed));
            }

            if attempt >= policy.max_attempts {
                tracing::warn!(
                    file_name = %file_name,
                    attempts = attempt,
                    error = ?error.cause,
                    "Upload failed, retries exhausted"
                );
                return Err(settle(error, may_have_landed));
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                file_name = %file_name,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = ?error.cause,
                "Upload attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(settle(
                        ClassifiedError::cancelled(file_name).with_attempts(attempt),
                        may_have_landed,
                    ));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn classify_put_error(file_name: &str, error: &StorageError) -> ClassifiedError {
    let kind = classify_storage_error(error);
    ClassifiedError::new(kind, file_name, upload_reason(kind)).with_cause(error.to_string())
}

fn upload_reason(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::AccessDenied => "Storage refused the upload",
        ErrorKind::Validation => "Storage rejected the file",
        _ => "Upload failed",
    }
}
