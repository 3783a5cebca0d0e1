// crates/server/src/routes/jobs.rs
//! API routes for download jobs.
//!
//! - GET  /jobs — List active (non-terminal) jobs
//! - GET  /jobs/{id} — One job, with its download link once completed
//! - POST /jobs/{id}/cancel — Stop a running job

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use mediadrop_core::{MediaFormat, Quality};
use serde::Serialize;

use crate::auth::ApiKey;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{Job, JobId, JobStatus};
use crate::state::AppState;

/// Client-facing view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub format: MediaFormat,
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `/api/downloaded/<file>?name=<user_filename>`, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let served_name = match job.status {
            JobStatus::Completed => job
                .output_path
                .as_deref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            _ => None,
        };
        let download_url = served_name.map(|file| match &job.display_name {
            Some(name) => format!("/api/downloaded/{file}?name={}", urlencoding::encode(name)),
            None => format!("/api/downloaded/{file}"),
        });

        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            format: job.format,
            quality: job.quality,
            error: job.error,
            user_filename: download_url.as_ref().and(job.display_name),
            download_url,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// GET /api/jobs — List all active jobs, oldest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobView>> {
    Json(state.manager.active_jobs().into_iter().map(JobView::from).collect())
}

/// GET /api/jobs/{id} — Current state of one job.
async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<JobView>> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.get_job(id)?.into()))
}

/// POST /api/jobs/{id}/cancel — Request cancellation.
///
/// The job turns Failed with reason "cancelled" once the engine stops;
/// the response shows the state at the time of the request.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    _key: ApiKey,
    Path(id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.cancel(id)?.into()))
}

fn parse_id(raw: &str) -> ApiResult<JobId> {
    raw.parse().map_err(|_| ApiError::JobNotFound(JobId::nil()))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}
