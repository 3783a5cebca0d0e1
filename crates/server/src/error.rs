// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::jobs::{JobError, JobId};

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    /// Rejected download request. The reason is logged, not returned.
    #[error("Invalid URL or format: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Route not found")]
    RouteNotFound,

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Unauthorized => {
                tracing::warn!("Rejected request with missing or wrong API key");
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("Unauthorized"))
            }
            ApiError::InvalidRequest(reason) => {
                tracing::warn!(reason = %reason, "Invalid download request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("Invalid URL or format"),
                )
            }
            ApiError::JobNotFound(id) => {
                tracing::debug!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::FileNotFound(name) => {
                tracing::debug!(filename = %name, "Downloaded file not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new("File not found"))
            }
            ApiError::RouteNotFound => (StatusCode::NOT_FOUND, ErrorResponse::new("Not found")),
            ApiError::Job(job_err) => match job_err {
                JobError::NotFound(id) => {
                    tracing::debug!(job_id = %id, "Job not found");
                    (
                        StatusCode::NOT_FOUND,
                        ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                    )
                }
                JobError::InvalidTransition { id, from, .. } => {
                    tracing::warn!(job_id = %id, status = %from, "Job already finished");
                    (
                        StatusCode::CONFLICT,
                        ErrorResponse::with_details("Job already finished", job_err.to_string()),
                    )
                }
                JobError::MissingOutputPath(id) => {
                    tracing::error!(job_id = %id, "Job completed without an output path");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Internal server error"),
                    )
                }
            },
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use axum::body::to_bytes;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_unauthorized_returns_401() {
        let (status, body) = extract_response(ApiError::Unauthorized.into_response()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "Unauthorized");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_hides_reason() {
        let error = ApiError::InvalidRequest("Unsupported format: flac".into());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Invalid URL or format");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_job_not_found_returns_404() {
        let id = JobId::new_v4();
        let (status, body) = extract_response(ApiError::from(JobError::NotFound(id)).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Job not found");
        assert!(body.details.unwrap().contains(&id.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_transition_returns_409() {
        let error = ApiError::Job(JobError::InvalidTransition {
            id: JobId::new_v4(),
            from: JobStatus::Completed,
            to: JobStatus::Failed,
        });
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "Job already finished");
    }

    #[tokio::test]
    async fn test_route_not_found_body() {
        let (status, body) = extract_response(ApiError::RouteNotFound.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Not found");
    }

    #[tokio::test]
    async fn test_internal_error_returns_500() {
        let error = ApiError::Internal("Something went wrong".to_string());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let json = serde_json::to_string(&ErrorResponse::new("Unauthorized")).unwrap();
        assert_eq!(json, "{\"error\":\"Unauthorized\"}");

        let json = serde_json::to_string(&ErrorResponse::with_details("Job not found", "More info")).unwrap();
        assert!(json.contains("\"details\":\"More info\""));
    }
}
