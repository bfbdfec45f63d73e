//! Batch coordinator
//!
//! Runs one pipeline per file on a bounded pool of tasks. A file's failure
//! never touches its siblings, and every input ends in exactly one of
//! `succeeded` or `failed`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vitrine_core::{
    BatchResult, ClassifiedError, CredentialProvider, ErrorKind, FailedUpload, UploadRequest,
    UploadResult,
};
use vitrine_storage::Storage;

use crate::config::PipelineConfig;
use crate::pipeline::UploadPipeline;
use crate::progress::{ProgressCallback, ProgressTracker, Stage};

enum Pending {
    Running(JoinHandle<Result<UploadResult, ClassifiedError>>),
    /// Never started because the batch was cancelled first
    Skipped(ClassifiedError),
}

pub struct BatchCoordinator {
    pipeline: Arc<UploadPipeline>,
    max_concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(pipeline: UploadPipeline) -> Self {
        let max_concurrency = pipeline.config().max_concurrency.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            max_concurrency,
        }
    }

    pub fn from_parts(
        storage: Arc<dyn Storage>,
        credentials: Arc<dyn CredentialProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self::new(UploadPipeline::new(storage, credentials, config))
    }

    pub fn pipeline(&self) -> &UploadPipeline {
        &self.pipeline
    }

    /// Validate a request without any network call.
    pub fn validate(&self, request: &UploadRequest) -> Result<String, ClassifiedError> {
        self.pipeline.validate(request)
    }

    pub async fn upload_batch(
        &self,
        requests: Vec<UploadRequest>,
        on_progress: Option<ProgressCallback>,
    ) -> BatchResult {
        self.upload_batch_with_cancel(requests, on_progress, CancellationToken::new())
            .await
    }

    /// Upload every request; cancelling `cancel` skips files not started yet
    /// and stops running ones at their next suspension point.
    pub async fn upload_batch_with_cancel(
        &self,
        requests: Vec<UploadRequest>,
        on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> BatchResult {
        if requests.is_empty() {
            return BatchResult::default();
        }

        let start = Instant::now();
        let total = requests.len();
        let tracker = ProgressTracker::new(total, on_progress);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut pending = Vec::with_capacity(total);

        tracing::info!(
            files = total,
            max_concurrency = self.max_concurrency,
            "Starting batch upload"
        );

        for (index, request) in requests.iter().enumerate() {
            let reporter = tracker.reporter(index, request.file_name.clone());
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                reporter.stage(Stage::Failed);
                pending.push(Pending::Skipped(ClassifiedError::cancelled(
                    &request.file_name,
                )));
                continue;
            };

            let pipeline = self.pipeline.clone();
            let request = request.clone();
            let cancel = cancel.clone();
            pending.push(Pending::Running(tokio::spawn(async move {
                let result = pipeline.process(&request, &reporter, &cancel).await;
                drop(permit); // Release semaphore permit
                result
            })));
        }

        let mut result = BatchResult::default();
        for (request, slot) in requests.into_iter().zip(pending) {
            let outcome = match slot {
                Pending::Skipped(error) => Err(error),
                Pending::Running(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            file_name = %request.file_name,
                            "Upload task failed"
                        );
                        Err(ClassifiedError::new(
                            ErrorKind::Transient,
                            &request.file_name,
                            "Upload task failed",
                        )
                        .with_cause(e.to_string()))
                    }
                },
            };

            match outcome {
                Ok(uploaded) => result.succeeded.push(uploaded),
                Err(error) => result.failed.push(FailedUpload { request, error }),
            }
        }

        tracing::info!(
            files = total,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            status = ?result.status(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Batch upload finished"
        );
        result
    }
}
