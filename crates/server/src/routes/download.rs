// crates/server/src/routes/download.rs
//! Download submission endpoint.
//!
//! - POST /download — start a job, return its id and follow-up URLs

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use mediadrop_core::{validate_url, MediaFormat, Quality};
use serde::{Deserialize, Serialize};

use crate::auth::ApiKey;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{JobId, JobRequest};
use crate::metrics::RequestTimer;
use crate::state::AppState;

/// Body of `POST /api/download`.
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub format: String,
    /// `"best"`, a height such as `720`, or `"720p"`. Defaults to best.
    #[serde(default)]
    pub quality: Option<Quality>,
}

impl DownloadRequest {
    /// Validate into the URL handed to the engine and the job parameters.
    pub fn validate(&self) -> Result<(String, JobRequest), ApiError> {
        let url = validate_url(&self.url).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let format: MediaFormat = self
            .format
            .parse()
            .map_err(|e: mediadrop_core::RequestError| ApiError::InvalidRequest(e.to_string()))?;
        let quality = self.quality.unwrap_or_default();
        Ok((url.to_string(), JobRequest::new(format, quality)))
    }
}

/// Response of `POST /api/download`.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct DownloadAccepted {
    pub progress_id: JobId,
    pub status_url: String,
    pub progress_url: String,
}

/// POST /api/download — Start a download job.
///
/// Returns 202 as soon as the job exists; the extraction runs in the
/// background and is followed through `progress_url` or `status_url`.
async fn start_download(
    State(state): State<Arc<AppState>>,
    _key: ApiKey,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DownloadAccepted>)> {
    let timer = RequestTimer::new("download");

    let validated = body
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
        .and_then(|Json(body)| body.validate());
    let (url, request) = match validated {
        Ok(v) => v,
        Err(e) => {
            timer.finish_err(400);
            return Err(e);
        }
    };

    let id = state.runner.start(url, request);
    timer.finish("202");

    Ok((
        StatusCode::ACCEPTED,
        Json(DownloadAccepted {
            progress_id: id,
            status_url: format!("/api/jobs/{id}"),
            progress_url: format!("/api/progress/{id}"),
        }),
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download", post(start_download))
}
