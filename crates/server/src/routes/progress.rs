//! Progress endpoints.
//!
//! - `GET /api/progress/{id}` — SSE stream, one event per progress change, ending at 100
//! - `GET /api/progress/{id}/status` — JSON snapshot for clients that cannot hold a stream

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use tokio_stream::{Stream, StreamExt};

use crate::jobs::{JobId, ProgressUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/progress/{id}", get(progress_stream))
        .route("/progress/{id}/status", get(progress_status))
}

/// GET /api/progress/{id} — SSE stream of a job's progress.
///
/// Each event is `data: {"progress": N, "status"?: ..., "error"?: ...}`.
/// Ids that are malformed, unknown or already purged yield one
/// `{"progress":100}` event and close, matching what a finished job looks like.
pub async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let job_id = id.parse::<JobId>().ok();
    let manager = Arc::clone(&state.manager);

    let stream = async_stream::stream! {
        match job_id {
            Some(job_id) => {
                let mut updates = std::pin::pin!(manager.stream_progress(job_id));
                while let Some(update) = updates.next().await {
                    yield Ok(sse_event(&update));
                }
            }
            None => {
                tracing::debug!(progress_id = %id, "Progress requested for malformed id");
                yield Ok(sse_event(&ProgressUpdate::gone()));
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/progress/{id}/status — current progress as JSON.
pub async fn progress_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<ProgressUpdate> {
    let update = id
        .parse::<JobId>()
        .ok()
        .and_then(|id| state.manager.get_job(id).ok())
        .map(|job| ProgressUpdate::from_job(&job))
        .unwrap_or_else(ProgressUpdate::gone);
    Json(update)
}

fn sse_event(update: &ProgressUpdate) -> Event {
    let json = serde_json::to_string(update).unwrap_or_else(|_| format!("{{\"progress\":{}}}", update.progress));
    Event::default().data(json)
}
