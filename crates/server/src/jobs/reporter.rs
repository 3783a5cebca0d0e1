// crates/server/src/jobs/reporter.rs
//! Progress sink handed to the extraction engine.

use std::sync::Arc;

use mediadrop_core::{ProgressEvent, ProgressSink};
use tokio_util::sync::CancellationToken;

use super::store::JobStore;
use super::types::{JobError, JobId, JobStatus, JobUpdate};

/// Handle bound to one job that turns engine events into store updates.
///
/// This is the only writer of in-flight progress; the terminal transition
/// belongs to the lifecycle manager.
#[derive(Clone)]
pub struct ProgressReporter {
    id: JobId,
    store: Arc<JobStore>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    pub(crate) fn new(id: JobId, store: Arc<JobStore>, cancel: CancellationToken) -> Self {
        Self { id, store, cancel }
    }

    pub fn job_id(&self) -> JobId {
        self.id
    }

    /// Token tripped when the job is cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record one engine event.
    ///
    /// `Downloading` stores the clamped percentage; `Finished` only keeps the
    /// job in Downloading, since postprocessing may still follow and 100 is
    /// reserved for finalization. Events for terminal or unknown jobs are
    /// dropped.
    pub fn report(&self, event: ProgressEvent) -> Result<(), JobError> {
        let update = match event.percent() {
            Some(percent) => JobUpdate::downloading(percent),
            None => {
                tracing::debug!(job_id = %self.id, "Engine finished a file");
                JobUpdate {
                    status: Some(JobStatus::Downloading),
                    ..JobUpdate::default()
                }
            }
        };
        self.store.update(self.id, update).map(|_| ())
    }
}

impl ProgressSink for ProgressReporter {
    fn on_event(&self, event: ProgressEvent) {
        if let Err(e) = self.report(event) {
            tracing::debug!(job_id = %self.id, error = %e, "Ignoring progress event");
        }
    }
}
