//! Shared helpers for the upload pipeline integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_storage;

use std::sync::Arc;
use std::time::Duration;

use vitrine_core::{CredentialProvider, NoCredentialProvider, StaticCredentialProvider};
use vitrine_storage::Storage;
use vitrine_upload::{BatchCoordinator, PipelineConfig, UploadPipeline};

pub use mock_storage::{Failure, MockStorage, ProbeBehavior};

/// Pipeline configuration without sleeps.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        operation_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
    .without_delays()
}

pub fn signed_in() -> Arc<dyn CredentialProvider> {
    Arc::new(StaticCredentialProvider::new("test-token"))
}

pub fn signed_out() -> Arc<dyn CredentialProvider> {
    Arc::new(NoCredentialProvider)
}

pub fn pipeline(storage: &Arc<MockStorage>) -> UploadPipeline {
    pipeline_with(storage, signed_in(), test_config())
}

pub fn pipeline_with(
    storage: &Arc<MockStorage>,
    credentials: Arc<dyn CredentialProvider>,
    config: PipelineConfig,
) -> UploadPipeline {
    let storage: Arc<dyn Storage> = storage.clone();
    UploadPipeline::new(storage, credentials, config)
}

pub fn coordinator(storage: &Arc<MockStorage>, max_concurrency: usize) -> BatchCoordinator {
    let config = PipelineConfig {
        max_concurrency,
        ..test_config()
    };
    BatchCoordinator::new(pipeline_with(storage, signed_in(), config))
}
