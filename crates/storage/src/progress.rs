//! Step-wise transfer progress logging.

use std::time::Instant;

use rusty_archival_common::{
    human_readable_bytes, ProgressCallback, ProgressStep, StepTracker, TaskLogger,
    PROGRESS_STEP_PERCENT,
};

use crate::types::{OperationType, TransferProgress};

/// Logs a line each time another 5% of an object's bytes has moved.
///
/// Workers report byte increments concurrently; the shared counter is
/// serialized by [`StepTracker`].
pub struct TransferProgressLogger {
    logger: TaskLogger,
    tracker: StepTracker,
    started: Instant,
}

impl TransferProgressLogger {
    /// Create a logger for one transfer of `total` bytes.
    pub fn new(logger: &TaskLogger, total: u64) -> Self {
        Self {
            logger: logger.clone(),
            tracker: StepTracker::new(total, PROGRESS_STEP_PERCENT),
            started: Instant::now(),
        }
    }

    /// Bytes reported so far.
    pub fn bytes(&self) -> u64 {
        self.tracker.bytes()
    }

    fn log_step(&self, progress: &TransferProgress, step: ProgressStep) {
        let elapsed: f64 = self.started.elapsed().as_secs_f64();
        let rate: u64 = if elapsed > 0.0 {
            (step.bytes as f64 / elapsed) as u64
        } else {
            step.bytes
        };
        let verb: &str = match progress.operation {
            OperationType::Uploading => "Uploaded",
            OperationType::Downloading => "Downloaded",
            OperationType::Copying => "Copied",
        };
        self.logger.info(format!(
            "{} {}% of {} ({} / {}, {}/s)",
            verb,
            step.percent,
            progress.key,
            human_readable_bytes(step.bytes),
            human_readable_bytes(step.total),
            human_readable_bytes(rate)
        ));
    }
}

impl ProgressCallback<TransferProgress> for TransferProgressLogger {
    fn on_progress(&self, progress: &TransferProgress) -> bool {
        for step in self.tracker.add(progress.bytes) {
            self.log_step(progress, step);
        }
        true
    }
}
