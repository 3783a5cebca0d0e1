// crates/server/src/jobs/stream.rs
//! Per-job progress streams.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_stream::Stream;

use super::store::JobStore;
use super::types::{Job, JobId, ProgressUpdate};

/// Fallback poll interval when no change notification arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Stream the progress of job `id` until it reaches a terminal status.
///
/// Edge-triggered: a value is yielded only when `progress` differs from the
/// last one yielded, so the first observation is always emitted and the last
/// one is always 100. The stream wakes on store notifications for this job and
/// re-checks every `poll_interval` regardless, which covers lagged receivers.
///
/// An unknown id (never created, or purged, including mid-stream) ends the
/// stream with a single terminal 100.
pub fn progress_stream(
    store: Arc<JobStore>,
    id: JobId,
    poll_interval: Duration,
) -> impl Stream<Item = ProgressUpdate> + Send + 'static {
    async_stream::stream! {
        // Subscribe before the first read so no change slips in between.
        let mut rx = store.subscribe();
        let mut last: Option<u8> = None;

        loop {
            let job = match store.get(id) {
                Ok(job) => job,
                Err(_) => {
                    if last != Some(100) {
                        yield ProgressUpdate::gone();
                    }
                    break;
                }
            };

            if last != Some(job.progress) {
                last = Some(job.progress);
                yield ProgressUpdate::from_job(&job);
            }
            if job.status.is_terminal() {
                break;
            }

            tokio::select! {
                _ = next_change(&mut rx, id) => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// Resolve once the store publishes something about `id`, or the receiver
/// lags or closes (the caller re-reads the store either way).
async fn next_change(rx: &mut broadcast::Receiver<Job>, id: JobId) {
    loop {
        match rx.recv().await {
            Ok(job) if job.id == id => return,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(job_id = %id, skipped, "Progress stream lagged");
                return;
            }
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}
