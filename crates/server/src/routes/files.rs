// crates/server/src/routes/files.rs
//! Serving finished artifacts.
//!
//! - GET /downloaded/{filename}?name= — stream the file as an attachment

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use mediadrop_core::filename::is_secure_filename;
use mediadrop_core::secure_filename;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadedQuery {
    /// Name the browser should save the file under.
    pub name: Option<String>,
}

/// GET /api/downloaded/{filename} — Send an artifact as a download.
///
/// Only flat, already-sanitised names are looked up in the download
/// directory; anything else is a 404, as is a file that has expired.
async fn serve_downloaded(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    Query(query): Query<DownloadedQuery>,
) -> ApiResult<Response> {
    if !is_secure_filename(&filename) {
        return Err(ApiError::FileNotFound(filename));
    }

    let path = state.config.download_dir.join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::FileNotFound(filename));
        }
        Err(e) => return Err(ApiError::Internal(format!("opening {}: {e}", path.display()))),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("reading {}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(ApiError::FileNotFound(filename));
    }

    let attachment_name = attachment_name(query.name.as_deref(), &filename);
    tracing::debug!(filename = %filename, attachment_name = %attachment_name, bytes = metadata.len(), "Serving artifact");

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{attachment_name}\""))
        .map_err(|e| ApiError::Internal(format!("content-disposition: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Name for the Content-Disposition header: the requested one, sanitised,
/// or the stored file name.
fn attachment_name(requested: Option<&str>, stored: &str) -> String {
    requested
        .map(secure_filename)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| stored.to_string())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/downloaded/{filename}", get(serve_downloaded))
}
