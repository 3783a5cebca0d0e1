//! API route handlers for the mediadrop server.

pub mod download;
pub mod files;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod progress;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - POST /api/download - Start a download job (requires `x-api-key`)
/// - GET  /api/progress/{id} - SSE stream of a job's progress
/// - GET  /api/progress/{id}/status - JSON snapshot of a job's progress
/// - GET  /api/jobs - List active jobs
/// - GET  /api/jobs/{id} - One job, with its download link once completed
/// - POST /api/jobs/{id}/cancel - Cancel a running job (requires `x-api-key`)
/// - GET  /api/downloaded/{filename}?name= - Fetch a finished artifact
/// - GET  /api/health - Health check
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", download::router())
        .nest("/api", progress::router())
        .nest("/api", jobs::router())
        .nest("/api", files::router())
        .merge(metrics::router())
        .with_state(state)
}
