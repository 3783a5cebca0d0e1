// crates/server/src/jobs/expiry.rs
//! Deferred deletion of finished artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::JobStore;
use super::types::JobId;

/// Default retention window for a finished artifact.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Default age after which the sweeper drops a finished job record.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(3600);

/// Arranges for an artifact to be removed after a delay.
///
/// Scheduling is fire-and-forget: it never blocks and never fails, because
/// by the time it is called the job has already delivered its value.
pub trait ExpiryScheduler: Send + Sync {
    fn schedule_deletion(&self, job_id: JobId, path: PathBuf, delay: Duration);

    /// Drop the record of a job that left no artifact behind.
    fn schedule_purge(&self, job_id: JobId, delay: Duration);
}

struct PendingDeletion {
    job_id: JobId,
    generation: u64,
    token: CancellationToken,
}

struct Inner {
    pending: Mutex<HashMap<PathBuf, PendingDeletion>>,
    next_generation: AtomicU64,
    store: Arc<JobStore>,
    purge_records: bool,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, PendingDeletion>> {
        self.pending.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned accessing pending deletions: {e}");
            e.into_inner()
        })
    }

    /// Claim the entry for `path` if it is still the one scheduled under
    /// `generation`.
    fn claim(&self, path: &Path, generation: u64) -> bool {
        let mut pending = self.pending();
        match pending.get(path) {
            Some(p) if p.generation == generation => {
                pending.remove(path);
                true
            }
            _ => false,
        }
    }

    async fn expire(&self, job_id: JobId, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(job_id = %job_id, path = %path.display(), "Expired artifact deleted");
                crate::metrics::record_artifact_expired();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(job_id = %job_id, path = %path.display(), "Expired artifact already gone");
            }
            Err(e) => {
                warn!(job_id = %job_id, path = %path.display(), error = %e, "Failed to delete expired artifact (non-fatal)");
            }
        }

        self.purge(job_id);
    }

    fn purge(&self, job_id: JobId) {
        if self.purge_records && self.store.delete(job_id).is_some() {
            debug!(job_id = %job_id, "Job record purged");
        }
    }
}

/// Timer-backed scheduler: one tokio task per scheduled deletion.
///
/// Pending deletions can be cancelled (the file is kept) or flushed (the
/// file is deleted right away), which is what shutdown uses.
#[derive(Clone)]
pub struct TimerExpiryScheduler {
    inner: Arc<Inner>,
}

impl TimerExpiryScheduler {
    /// When `purge_records` is set, the job record is dropped from `store`
    /// together with its artifact.
    pub fn new(store: Arc<JobStore>, purge_records: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                store,
                purge_records,
            }),
        }
    }

    /// Number of deletions waiting for their timer.
    pub fn pending(&self) -> usize {
        self.inner.pending().len()
    }

    /// Drop the pending deletion for `path`, keeping the file.
    /// Returns false if nothing was scheduled for it.
    pub fn cancel(&self, path: &Path) -> bool {
        match self.inner.pending().remove(path) {
            Some(p) => {
                p.token.cancel();
                debug!(job_id = %p.job_id, path = %path.display(), "Scheduled deletion cancelled");
                true
            }
            None => false,
        }
    }

    /// Delete every pending artifact now. Returns how many were processed.
    pub async fn flush(&self) -> usize {
        let drained: Vec<(PathBuf, PendingDeletion)> = self.inner.pending().drain().collect();
        let count = drained.len();
        for (path, p) in drained {
            p.token.cancel();
            self.inner.expire(p.job_id, &path).await;
        }
        if count > 0 {
            info!(count, "Flushed pending artifact deletions");
        }
        count
    }
}

impl ExpiryScheduler for TimerExpiryScheduler {
    fn schedule_deletion(&self, job_id: JobId, path: PathBuf, delay: Duration) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.inner.pending().insert(
            path.clone(),
            PendingDeletion {
                job_id,
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        debug!(job_id = %job_id, path = %path.display(), delay_secs = delay.as_secs(), "Artifact deletion scheduled");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if inner.claim(&path, generation) {
                inner.expire(job_id, &path).await;
            }
        });
    }

    fn schedule_purge(&self, job_id: JobId, delay: Duration) {
        if !self.inner.purge_records {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.purge(job_id);
        });
    }
}

/// Periodically drop finished job records older than `max_age`, until
/// `shutdown` fires.
///
/// Runs regardless of per-job purging so the table stays bounded.
pub fn spawn_record_sweeper(
    store: Arc<JobStore>,
    max_age: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            warn!(?max_age, "Record TTL out of range; sweeper disabled");
            return;
        };
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let removed = store.evict_finished_before(chrono::Utc::now() - max_age);
            if removed > 0 {
                debug!(removed, remaining = store.len(), "Swept finished job records");
            }
        }
    })
}
