// crates/server/src/jobs/manager.rs
//! Job creation, finalization and cancellation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::expiry::{ExpiryScheduler, DEFAULT_RETENTION};
use super::reporter::ProgressReporter;
use super::store::JobStore;
use super::stream::{progress_stream, DEFAULT_POLL_INTERVAL};
use super::types::{Job, JobError, JobId, JobRequest, JobStatus, JobUpdate, Outcome, ProgressUpdate};

/// Settings the manager needs from the server configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory artifacts are written to, named `<job id>.<ext>`.
    pub download_dir: PathBuf,
    /// How long a finished artifact stays on disk.
    pub retention: Duration,
    /// Fallback poll interval for progress streams.
    pub poll_interval: Duration,
    /// Remove `<job id>.*` leftovers when a job fails.
    pub delete_partials_on_failure: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            retention: DEFAULT_RETENTION,
            poll_interval: DEFAULT_POLL_INTERVAL,
            delete_partials_on_failure: true,
        }
    }
}

/// Owns the job table and every transition into and out of it.
pub struct JobLifecycleManager {
    store: Arc<JobStore>,
    scheduler: Arc<dyn ExpiryScheduler>,
    config: ManagerConfig,
    cancellations: Mutex<HashMap<JobId, CancellationToken>>,
}

impl JobLifecycleManager {
    pub fn new(store: Arc<JobStore>, scheduler: Arc<dyn ExpiryScheduler>, config: ManagerConfig) -> Self {
        Self {
            store,
            scheduler,
            config,
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    fn cancellations(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.cancellations.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned accessing cancellation tokens: {e}");
            e.into_inner()
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a Pending job and hand back the reporter the engine feeds.
    pub fn create_job(&self, request: JobRequest) -> (JobId, ProgressReporter) {
        let job = self.store.create(request);
        let token = CancellationToken::new();
        self.cancellations().insert(job.id, token.clone());

        crate::metrics::record_job_created(job.format.extension());
        info!(job_id = %job.id, format = %job.format, quality = %job.quality, "Job created");

        (job.id, ProgressReporter::new(job.id, Arc::clone(&self.store), token))
    }

    /// Artifact path stem for a job: `<download_dir>/<id>`.
    pub fn output_stem(&self, id: JobId) -> PathBuf {
        self.config.download_dir.join(id.to_string())
    }

    pub fn get_job(&self, id: JobId) -> Result<Job, JobError> {
        self.store.get(id)
    }

    pub fn active_jobs(&self) -> Vec<Job> {
        self.store.active()
    }

    /// Edge-triggered progress values for `id`, ending at 100.
    pub fn stream_progress(&self, id: JobId) -> impl Stream<Item = ProgressUpdate> + Send + 'static {
        progress_stream(Arc::clone(&self.store), id, self.config.poll_interval)
    }

    /// Move the job to its terminal status.
    ///
    /// On success the artifact is scheduled for deletion after the retention
    /// window. On failure, partial files are optionally removed right away and
    /// the record is scheduled for purging after the same window.
    /// A second finalize for the same job is rejected and changes nothing.
    pub async fn finalize(&self, id: JobId, outcome: Outcome) -> Result<Job, JobError> {
        let result = match outcome {
            Outcome::Success { path, display_name } => {
                let job = self
                    .store
                    .update(id, JobUpdate::completed(path.clone(), display_name))?;
                self.scheduler
                    .schedule_deletion(id, path, self.config.retention);
                info!(job_id = %id, display_name = ?job.display_name, "Job completed");
                job
            }
            Outcome::Failure { reason } => {
                let job = self.store.update(id, JobUpdate::failed(reason))?;
                warn!(job_id = %id, error = ?job.error, "Job failed");
                if self.config.delete_partials_on_failure {
                    self.remove_partials(id).await;
                }
                self.scheduler.schedule_purge(id, self.config.retention);
                job
            }
        };

        self.cancellations().remove(&id);
        let elapsed = result
            .finished_at
            .and_then(|end| (end - result.created_at).to_std().ok())
            .unwrap_or_default();
        crate::metrics::record_job_finished(result.status.as_str(), result.format.extension(), elapsed);
        Ok(result)
    }

    /// Ask a running job to stop. The runner finalizes it as Failed.
    pub fn cancel(&self, id: JobId) -> Result<Job, JobError> {
        let job = self.store.get(id)?;
        if job.status.is_terminal() {
            return Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to: JobStatus::Failed,
            });
        }

        if let Some(token) = self.cancellations().get(&id) {
            token.cancel();
        }
        crate::metrics::record_job_cancelled();
        info!(job_id = %id, "Job cancellation requested");
        Ok(job)
    }

    async fn remove_partials(&self, id: JobId) {
        let prefix = id.to_string();
        match mediadrop_core::artifact::purge_partials(&self.config.download_dir, &prefix).await {
            Ok(0) => {}
            Ok(removed) => debug!(job_id = %id, removed, "Partial files removed"),
            Err(e) => warn!(job_id = %id, error = %e, "Failed to remove partial files (non-fatal)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadrop_core::{MediaFormat, Quality};
    use tokio_stream::StreamExt;

    #[derive(Default)]
    struct RecordingScheduler {
        calls: Mutex<Vec<(JobId, PathBuf, Duration)>>,
        purges: Mutex<Vec<(JobId, Duration)>>,
    }

    impl RecordingScheduler {
        fn calls(&self) -> Vec<(JobId, PathBuf, Duration)> {
            self.calls.lock().unwrap().clone()
        }

        fn purges(&self) -> Vec<(JobId, Duration)> {
            self.purges.lock().unwrap().clone()
        }
    }

    impl ExpiryScheduler for RecordingScheduler {
        fn schedule_deletion(&self, job_id: JobId, path: PathBuf, delay: Duration) {
            self.calls.lock().unwrap().push((job_id, path, delay));
        }

        fn schedule_purge(&self, job_id: JobId, delay: Duration) {
            self.purges.lock().unwrap().push((job_id, delay));
        }
    }

    fn manager(dir: PathBuf) -> (JobLifecycleManager, Arc<RecordingScheduler>) {
        let scheduler = Arc::new(RecordingScheduler::default());
        let config = ManagerConfig {
            download_dir: dir,
            poll_interval: Duration::from_millis(20),
            ..ManagerConfig::default()
        };
        let manager = JobLifecycleManager::new(
            Arc::new(JobStore::new()),
            Arc::clone(&scheduler) as Arc<dyn ExpiryScheduler>,
            config,
        );
        (manager, scheduler)
    }

    fn downloading(done: u64, total: u64) -> mediadrop_core::ProgressEvent {
        mediadrop_core::ProgressEvent::Downloading {
            bytes_done: done,
            bytes_total: Some(total),
        }
    }

    #[tokio::test]
    async fn test_completed_job_flow() {
        let (manager, scheduler) = manager(PathBuf::from("/tmp"));
        let (id, reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp3, Quality::Best));
        assert_eq!(manager.get_job(id).unwrap().status, JobStatus::Pending);

        reporter.report(downloading(50, 200)).unwrap();
        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 25);

        let job = manager
            .finalize(
                id,
                Outcome::Success {
                    path: PathBuf::from("/tmp/j1.mp3"),
                    display_name: "song.mp3".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.display_name.as_deref(), Some("song.mp3"));

        assert_eq!(
            scheduler.calls(),
            vec![(id, PathBuf::from("/tmp/j1.mp3"), Duration::from_secs(600))]
        );
        assert!(scheduler.purges().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_flow() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, scheduler) = manager(dir.path().to_path_buf());
        let (id, _reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp4, Quality::Best));

        let job = manager
            .finalize(id, Outcome::failure("unsupported url"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("unsupported url"));
        assert!(scheduler.calls().is_empty());
        assert_eq!(scheduler.purges(), vec![(id, Duration::from_secs(600))]);
        assert!(manager.get_job(id).is_ok());

        let updates: Vec<_> = manager.stream_progress(id).collect().await;
        assert_eq!(updates.last().unwrap().progress, 100);
        assert_eq!(updates.last().unwrap().status, Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_second_finalize_is_rejected() {
        let (manager, scheduler) = manager(PathBuf::from("/tmp"));
        let (id, _reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp3, Quality::Best));

        manager.finalize(id, Outcome::failure("boom")).await.unwrap();
        let err = manager
            .finalize(
                id,
                Outcome::Success {
                    path: PathBuf::from("/tmp/late.mp3"),
                    display_name: "late.mp3".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));

        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_unknown_job() {
        let (manager, _) = manager(PathBuf::from("/tmp"));
        let id = JobId::new_v4();
        assert_eq!(
            manager.finalize(id, Outcome::failure("x")).await,
            Err(JobError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_failure_removes_partials() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(dir.path().to_path_buf());
        let (id, _reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp4, Quality::Best));

        let partial = dir.path().join(format!("{id}.f137.mp4.part"));
        let other = dir.path().join("someone-else.mp4");
        std::fs::write(&partial, b"x").unwrap();
        std::fs::write(&other, b"y").unwrap();

        manager.finalize(id, Outcome::failure("network")).await.unwrap();
        assert!(!partial.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_cancel_trips_reporter_token() {
        let (manager, _) = manager(PathBuf::from("/tmp"));
        let (id, reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp3, Quality::Best));

        assert!(!reporter.is_cancelled());
        manager.cancel(id).unwrap();
        assert!(reporter.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_terminal_or_unknown() {
        let (manager, _) = manager(PathBuf::from("/tmp"));
        let (id, _reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp3, Quality::Best));
        manager.finalize(id, Outcome::failure("boom")).await.unwrap();

        assert!(matches!(
            manager.cancel(id),
            Err(JobError::InvalidTransition { .. })
        ));
        let unknown = JobId::new_v4();
        assert!(matches!(manager.cancel(unknown), Err(JobError::NotFound(x)) if x == unknown));
    }

    #[tokio::test]
    async fn test_active_jobs_and_output_stem() {
        let dir = PathBuf::from("/srv/downloads");
        let (manager, _) = manager(dir.clone());
        let (a, _) = manager.create_job(JobRequest::new(MediaFormat::Mp3, Quality::Best));
        let (b, _) = manager.create_job(JobRequest::new(MediaFormat::Mp4, Quality::MaxHeight(480)));
        manager.finalize(b, Outcome::failure("boom")).await.unwrap();

        let active: Vec<JobId> = manager.active_jobs().iter().map(|j| j.id).collect();
        assert_eq!(active, vec![a]);
        assert_eq!(manager.output_stem(a), dir.join(a.to_string()));
    }

    #[tokio::test]
    async fn test_expired_job_streams_single_100() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new());
        let expiry = crate::jobs::TimerExpiryScheduler::new(Arc::clone(&store), true);
        let manager = JobLifecycleManager::new(
            Arc::clone(&store),
            Arc::new(expiry) as Arc<dyn ExpiryScheduler>,
            ManagerConfig {
                download_dir: dir.path().to_path_buf(),
                retention: Duration::from_millis(20),
                poll_interval: Duration::from_millis(20),
                ..ManagerConfig::default()
            },
        );

        let (id, reporter) = manager.create_job(JobRequest::new(MediaFormat::Mp3, Quality::Best));
        reporter.report(downloading(3, 4)).unwrap();
        let path = dir.path().join(format!("{id}.mp3"));
        std::fs::write(&path, b"media").unwrap();
        manager
            .finalize(
                id,
                Outcome::Success {
                    path: path.clone(),
                    display_name: "song.mp3".into(),
                },
            )
            .await
            .unwrap();

        for _ in 0..100 {
            if manager.get_job(id).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get_job(id), Err(JobError::NotFound(id)));
        assert!(!path.exists());

        let updates: Vec<_> = manager.stream_progress(id).collect().await;
        assert_eq!(updates, vec![ProgressUpdate::gone()]);
    }
}
