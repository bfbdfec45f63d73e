//! Per-file and batch progress reporting.

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Pipeline stage a file is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Validating,
    Compressing,
    Uploading,
    Verifying,
    ResolvingFallback,
    Done,
    Failed,
}

impl Stage {
    /// Fraction of the file's work considered complete on entering the stage.
    pub fn percent(self) -> f32 {
        match self {
            Stage::Queued => 0.0,
            Stage::Validating => 5.0,
            Stage::Compressing => 15.0,
            Stage::Uploading => 30.0,
            Stage::Verifying => 80.0,
            Stage::ResolvingFallback => 90.0,
            Stage::Done | Stage::Failed => 100.0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileProgress {
    /// Position of the file in the submitted batch
    pub index: usize,
    pub file_name: String,
    pub stage: Stage,
    pub percent: f32,
    /// Upload attempt, set while uploading
    pub attempt: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub file: FileProgress,
    /// Mean of every file's percent
    pub overall_percent: f32,
}

pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// Tracks every file's percent and forwards events to the caller.
#[derive(Clone)]
pub struct ProgressTracker {
    percents: Arc<Mutex<Vec<f32>>>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(file_count: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            percents: Arc::new(Mutex::new(vec![0.0; file_count])),
            callback,
        }
    }

    /// Tracker for a single file that nobody listens to.
    pub fn detached() -> Self {
        Self::new(1, None)
    }

    pub fn reporter(&self, index: usize, file_name: impl Into<String>) -> FileReporter {
        FileReporter {
            tracker: self.clone(),
            index,
            file_name: file_name.into(),
        }
    }

    pub fn overall_percent(&self) -> f32 {
        let percents = match self.percents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        mean(&percents)
    }

    fn record(&self, file: FileProgress) {
        let overall = {
            let mut percents = match self.percents.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(slot) = percents.get_mut(file.index) {
                // Progress never moves backwards for a file.
                *slot = slot.max(file.percent);
            }
            mean(&percents)
        };

        if let Some(callback) = &self.callback {
            callback(&BatchProgress {
                file,
                overall_percent: overall,
            });
        }
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 100.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Handle one file's pipeline uses to report its stages.
#[derive(Clone)]
pub struct FileReporter {
    tracker: ProgressTracker,
    index: usize,
    file_name: String,
}

impl FileReporter {
    pub fn stage(&self, stage: Stage) {
        self.emit(stage, stage.percent(), None);
    }

    /// Report an upload attempt. Later attempts sit higher inside the uploading band.
    pub fn attempt(&self, attempt: u32, max_attempts: u32) {
        let band = Stage::Verifying.percent() - Stage::Uploading.percent();
        let step = band / max_attempts.max(1) as f32;
        let percent = Stage::Uploading.percent() + step * attempt.saturating_sub(1) as f32;
        self.emit(Stage::Uploading, percent, Some(attempt));
    }

    fn emit(&self, stage: Stage, percent: f32, attempt: Option<u32>) {
        self.tracker.record(FileProgress {
            index: self.index,
            file_name: self.file_name.clone(),
            stage,
            percent,
            attempt,
        });
    }
}
