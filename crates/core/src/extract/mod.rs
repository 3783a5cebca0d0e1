// crates/core/src/extract/mod.rs
//! The extraction seam: something that turns a URL into a file on disk.
//!
//! Provides:
//! - `Extractor` — async trait implemented by engines
//! - `ExtractRequest` / `Extracted` — what goes in and what comes out
//! - `YtDlpExtractor` — the `yt-dlp` subprocess engine

pub mod ytdlp;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExtractError;
use crate::progress::ProgressSink;
use crate::request::{MediaFormat, Quality};

pub use ytdlp::YtDlpExtractor;

/// Everything an engine needs to fetch one piece of media.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
    /// Output path without extension; the engine picks the extension.
    pub output_stem: PathBuf,
}

/// A finished extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Location of the artifact on disk, after postprocessing.
    pub path: PathBuf,
    /// Source title, when the engine reported one.
    pub title: Option<String>,
}

/// A media extraction engine.
///
/// Implementations report progress through `sink` while they run and must
/// return promptly with [`ExtractError::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        request: &ExtractRequest,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<Extracted, ExtractError>;
}
