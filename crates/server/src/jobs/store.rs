// crates/server/src/jobs/store.rs
//! The shared job table.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::types::{Job, JobError, JobId, JobRequest, JobUpdate};

/// Process-wide table of jobs.
///
/// Every read-modify-write happens under one write lock, so concurrent
/// updates from the reporter, the finalizer and the expiry task cannot
/// interleave into a status regression. Uses `std::sync::RwLock` because the
/// lock is never held across an `.await`.
///
/// Each successful mutation is published on a broadcast channel so readers
/// can wait for changes instead of spinning.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    changes: broadcast::Sender<Job>,
}

impl JobStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            jobs: RwLock::new(HashMap::new()),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned reading jobs map: {e}");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing jobs map: {e}");
            e.into_inner()
        })
    }

    /// Insert a new Pending job under a fresh id.
    pub fn create(&self, request: JobRequest) -> Job {
        let mut jobs = self.write();
        let mut id = Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let job = Job::new(id, request);
        jobs.insert(id, job.clone());
        drop(jobs);

        let _ = self.changes.send(job.clone());
        job
    }

    /// Merge `update` into the job and return the result.
    pub fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, JobError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        let changed = job.apply(update)?;
        let snapshot = job.clone();
        drop(jobs);

        if changed {
            // No subscribers is fine.
            let _ = self.changes.send(snapshot.clone());
        }
        Ok(snapshot)
    }

    pub fn get(&self, id: JobId) -> Result<Job, JobError> {
        self.read().get(&id).cloned().ok_or(JobError::NotFound(id))
    }

    /// Remove the record. Returns it if it existed.
    pub fn delete(&self, id: JobId) -> Option<Job> {
        let removed = self.write().remove(&id);
        if let Some(job) = &removed {
            let _ = self.changes.send(job.clone());
        }
        removed
    }

    /// Remove every terminal job that finished before `cutoff`. Returns how
    /// many records were dropped.
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.write();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.finished_at.is_some_and(|t| t < cutoff))
            .map(|j| j.id)
            .collect();
        let removed: Vec<Job> = expired.iter().filter_map(|id| jobs.remove(id)).collect();
        drop(jobs);

        for job in &removed {
            let _ = self.changes.send(job.clone());
        }
        removed.len()
    }

    /// All jobs that have not reached a terminal status, oldest first.
    pub fn active(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .read()
            .values()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to post-mutation snapshots of every job.
    ///
    /// A deleted job is published one last time with its final state;
    /// readers detect the removal with [`JobStore::get`].
    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.changes.subscribe()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobStatus;
    use mediadrop_core::{MediaFormat, Quality};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn request() -> JobRequest {
        JobRequest::new(MediaFormat::Mp4, Quality::MaxHeight(720))
    }

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        let job = store.create(request());

        let fetched = store.get(job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.progress, 0);
        assert_eq!(fetched.quality, Quality::MaxHeight(720));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let store = JobStore::new();
        let a = store.create(request());
        let b = store.create(request());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        assert_eq!(
            store.update(id, JobUpdate::downloading(10)),
            Err(JobError::NotFound(id))
        );
        assert_eq!(store.get(id), Err(JobError::NotFound(id)));
    }

    #[test]
    fn test_delete() {
        let store = JobStore::new();
        let job = store.create(request());
        assert!(store.delete(job.id).is_some());
        assert!(store.delete(job.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_evict_finished_before_keeps_active_and_recent() {
        let store = JobStore::new();
        let running = store.create(request());
        let failed = store.create(request());
        store.update(running.id, JobUpdate::downloading(5)).unwrap();
        store.update(failed.id, JobUpdate::failed("boom")).unwrap();

        let earlier = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.evict_finished_before(earlier), 0);
        assert_eq!(store.len(), 2);

        let later = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.evict_finished_before(later), 1);
        assert!(store.get(failed.id).is_err());
        assert_eq!(store.get(running.id).unwrap().status, JobStatus::Downloading);
    }

    #[test]
    fn test_active_excludes_terminal() {
        let store = JobStore::new();
        let running = store.create(request());
        let done = store.create(request());
        store.update(running.id, JobUpdate::downloading(5)).unwrap();
        store
            .update(done.id, JobUpdate::completed(PathBuf::from("/tmp/x.mp4"), "x.mp4".into()))
            .unwrap();

        let active = store.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
    }

    #[test]
    fn test_failed_is_never_overwritten() {
        let store = JobStore::new();
        let job = store.create(request());
        store.update(job.id, JobUpdate::failed("network down")).unwrap();

        assert!(store.update(job.id, JobUpdate::downloading(60)).is_err());
        let job = store.get(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("network down"));
    }

    #[test]
    fn test_concurrent_updates_never_regress() {
        let store = Arc::new(JobStore::new());
        let job = store.create(request());

        let writers: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for p in 0..100u8 {
                        let _ = store.update(job.id, JobUpdate::downloading(p.saturating_add(t)));
                    }
                })
            })
            .collect();
        let failer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let _ = store.update(job.id, JobUpdate::failed("aborted"));
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        failer.join().unwrap();

        let job = store.get(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes_only() {
        let store = JobStore::new();
        let job = store.create(request());
        let mut rx = store.subscribe();

        store.update(job.id, JobUpdate::downloading(30)).unwrap();
        // Same value again: no notification.
        store.update(job.id, JobUpdate::downloading(30)).unwrap();
        store.update(job.id, JobUpdate::downloading(31)).unwrap();

        assert_eq!(rx.recv().await.unwrap().progress, 30);
        assert_eq!(rx.recv().await.unwrap().progress, 31);
        assert!(rx.try_recv().is_err());
    }
}
