// crates/server/src/lib.rs
//! Mediadrop server library.
//!
//! Axum HTTP server that downloads media through `yt-dlp` in the
//! background, streams per-job progress over SSE and serves the finished
//! files for a limited time.

pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes and `/metrics`
/// - `GET /` serving `index.html` from the static directory, when configured
/// - JSON 404 for everything else
/// - CORS (allows any origin) and request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = api_routes(Arc::clone(&state));

    if let Some(static_dir) = &state.config.static_dir {
        let index = static_dir.join("index.html");
        tracing::info!(path = %index.display(), "Serving index page");
        app = app.route_service("/", ServeFile::new(index));
    }

    app.fallback(not_found).layer(cors).layer(TraceLayer::new_for_http())
}

async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

// ============================================================================
// Integration Tests
// ============================================================================
