// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running the external extraction engine.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download: {message}")]
    ExtractionFailed { message: String },

    #[error("{format} file not found after conversion: {path}")]
    ArtifactMissing { format: String, path: PathBuf },

    #[error("cancelled")]
    Cancelled,

    #[error("IO error while extracting: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            message: message.into(),
        }
    }

    /// Whether the failure was requested by the caller rather than caused by
    /// the engine.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors produced when parsing a download request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid quality: {0}")]
    InvalidQuality(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::failed("unsupported url");
        assert_eq!(err.to_string(), "Failed to download: unsupported url");

        let err = ExtractError::ArtifactMissing {
            format: "MP3".to_string(),
            path: PathBuf::from("downloads/abc.mp3"),
        };
        assert_eq!(
            err.to_string(),
            "MP3 file not found after conversion: downloads/abc.mp3"
        );

        assert_eq!(ExtractError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(ExtractError::Cancelled.is_cancelled());
        assert!(!ExtractError::failed("boom").is_cancelled());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk error");
        let err: ExtractError = io.into();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
