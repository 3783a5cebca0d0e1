// crates/server/src/jobs/types.rs
//! Types for the download job lifecycle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mediadrop_core::{MediaFormat, Quality, MAX_IN_FLIGHT_PERCENT};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job. Also the stem of its artifact file.
pub type JobId = Uuid;

/// Status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a job in `self` may move to `next`.
    ///
    /// Pending may skip straight to a terminal status (an engine that emits
    /// no progress). Re-asserting a non-terminal status is allowed; nothing
    /// leaves a terminal status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => !a.is_terminal(),
            (Self::Pending, _) => true,
            (Self::Downloading, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for. URL handling stays with the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRequest {
    pub format: MediaFormat,
    pub quality: Quality,
}

impl JobRequest {
    pub fn new(format: MediaFormat, quality: Quality) -> Self {
        Self { format, quality }
    }
}

/// One tracked download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub format: MediaFormat,
    pub quality: Quality,
    /// Artifact location on the server; never sent to clients.
    #[serde(skip)]
    pub output_path: Option<PathBuf>,
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, request: JobRequest) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            format: request.format,
            quality: request.quality,
            output_path: None,
            display_name: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Merge `update` into the record, enforcing the lifecycle rules.
    ///
    /// Returns whether anything observable changed. On error the record is
    /// left untouched.
    pub fn apply(&mut self, update: JobUpdate) -> Result<bool, JobError> {
        let next = update.status.unwrap_or(self.status);
        if self.status.is_terminal() || !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        if next == JobStatus::Completed && update.output_path.is_none() && self.output_path.is_none() {
            return Err(JobError::MissingOutputPath(self.id));
        }

        let before = self.clone();

        if let Some(progress) = update.progress {
            let ceiling = if next.is_terminal() { 100 } else { MAX_IN_FLIGHT_PERCENT };
            self.progress = self.progress.max(progress.min(ceiling));
        }
        if let Some(path) = update.output_path {
            self.output_path = Some(path);
        }
        if let Some(name) = update.display_name {
            self.display_name = Some(name);
        }
        if next == JobStatus::Failed {
            self.error = Some(
                update
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "unknown error".to_string()),
            );
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.status = next;

        Ok(*self != before)
    }
}

/// Partial update merged into a [`Job`] by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub progress: Option<u8>,
    pub status: Option<JobStatus>,
    pub output_path: Option<PathBuf>,
    pub display_name: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// In-flight progress report.
    pub fn downloading(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            status: Some(JobStatus::Downloading),
            ..Self::default()
        }
    }

    pub fn completed(path: PathBuf, display_name: String) -> Self {
        Self {
            progress: Some(100),
            status: Some(JobStatus::Completed),
            output_path: Some(path),
            display_name: Some(display_name),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            progress: Some(100),
            status: Some(JobStatus::Failed),
            error: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// How the extraction workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { path: PathBuf, display_name: String },
    Failure { reason: String },
}

impl Outcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// One value of a progress stream, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub progress: u8,
    /// `None` when the job is unknown (never created, or already purged).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn from_job(job: &Job) -> Self {
        Self {
            progress: job.progress,
            status: Some(job.status),
            error: job.error.clone(),
        }
    }

    /// Terminal value for a job we know nothing about.
    pub fn gone() -> Self {
        Self {
            progress: 100,
            status: None,
            error: None,
        }
    }
}

/// Errors from the job lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {0} cannot complete without an output path")]
    MissingOutputPath(JobId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(Uuid::new_v4(), JobRequest::new(MediaFormat::Mp3, Quality::Best))
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Downloading));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Downloading.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Completed));
        assert!(Downloading.can_transition_to(Failed));
        assert!(!Downloading.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Downloading));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn test_apply_progress_is_monotonic_and_clamped() {
        let mut job = job();
        assert!(job.apply(JobUpdate::downloading(40)).unwrap());
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 40);

        // Lower value is ignored.
        assert!(!job.apply(JobUpdate::downloading(10)).unwrap());
        assert_eq!(job.progress, 40);

        // 100 is not reachable in flight.
        job.apply(JobUpdate::downloading(100)).unwrap();
        assert_eq!(job.progress, 99);
    }

    #[test]
    fn test_apply_completed_sets_fields() {
        let mut job = job();
        job.apply(JobUpdate::completed(PathBuf::from("/tmp/a.mp3"), "song.mp3".into()))
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_path, Some(PathBuf::from("/tmp/a.mp3")));
        assert_eq!(job.display_name.as_deref(), Some("song.mp3"));
        assert!(job.finished_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_apply_rejects_completion_without_path() {
        let mut job = job();
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            ..JobUpdate::default()
        };
        assert_eq!(job.apply(update), Err(JobError::MissingOutputPath(job.id)));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_apply_rejects_updates_after_terminal() {
        let mut job = job();
        job.apply(JobUpdate::failed("boom")).unwrap();
        let snapshot = job.clone();

        let err = job.apply(JobUpdate::downloading(50)).unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidTransition {
                id: job.id,
                from: JobStatus::Failed,
                to: JobStatus::Downloading,
            }
        );
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_failed_without_reason_gets_placeholder() {
        let mut job = job();
        job.apply(JobUpdate::failed("")).unwrap();
        assert_eq!(job.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_job_serialize_hides_output_path() {
        let mut job = job();
        job.apply(JobUpdate::completed(PathBuf::from("/srv/secret/a.mp3"), "a.mp3".into()))
            .unwrap();
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
        assert!(json.contains("\"progress\":100"));
        assert!(json.contains("\"format\":\"mp3\""));
        assert!(json.contains("\"quality\":\"best\""));
        assert!(!json.contains("/srv/secret"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_progress_update_serialize() {
        let json = serde_json::to_string(&ProgressUpdate::gone()).unwrap();
        assert_eq!(json, "{\"progress\":100}");

        let mut job = job();
        job.apply(JobUpdate::downloading(25)).unwrap();
        let json = serde_json::to_string(&ProgressUpdate::from_job(&job)).unwrap();
        assert_eq!(json, "{\"progress\":25,\"status\":\"downloading\"}");
    }
}
