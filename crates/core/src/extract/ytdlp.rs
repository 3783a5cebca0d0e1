// crates/core/src/extract/ytdlp.rs
//! `yt-dlp` subprocess engine.
//!
//! The engine is driven entirely through its command line. Progress hook
//! calls and the final file location are requested with marker-prefixed
//! templates so they can be picked out of the regular output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ExtractRequest, Extracted, Extractor};
use crate::artifact::resolve_artifact;
use crate::error::ExtractError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::request::{MediaFormat, Quality};

const PROGRESS_MARKER: &str = "[mediadrop:progress]";
const FILE_MARKER: &str = "[mediadrop:file]";
const TITLE_MARKER: &str = "[mediadrop:title]";

/// Runs the `yt-dlp` binary once per download.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: String,
    cookies_file: Option<PathBuf>,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cookies_file: None,
        }
    }

    /// Pass a Netscape cookie jar to every invocation.
    pub fn with_cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    /// Ask the binary for its version. `None` if it cannot be run.
    pub async fn version(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
    }

    fn build_args(&self, request: &ExtractRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-playlist".into(),
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!(
                "download:{PROGRESS_MARKER} %(progress.status)s %(progress.downloaded_bytes)s \
                 %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
            ),
            "--print".into(),
            format!("after_move:{FILE_MARKER} %(filepath)s"),
            "--print".into(),
            format!("after_move:{TITLE_MARKER} %(title)s"),
            // --print implies --simulate
            "--no-simulate".into(),
            "-o".into(),
            output_template(&request.output_stem),
        ];

        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.display().to_string());
        }

        args.extend(format_args(request.format, request.quality));
        args.push("--".into());
        args.push(request.url.clone());
        args
    }
}

fn output_template(stem: &Path) -> String {
    format!("{}.%(ext)s", stem.display())
}

/// Format selection flags for the requested output.
fn format_args(format: MediaFormat, quality: Quality) -> Vec<String> {
    match format {
        MediaFormat::Mp3 => vec![
            "-f".into(),
            "bestaudio/best".into(),
            "-x".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--audio-quality".into(),
            "192K".into(),
        ],
        MediaFormat::Mp4 => {
            let selector = match quality {
                Quality::Best => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
                Quality::MaxHeight(h) => format!(
                    "bestvideo[ext=mp4][height<={h}]+bestaudio[ext=m4a]/best[ext=mp4][height<={h}]/best"
                ),
            };
            vec![
                "-f".into(),
                selector,
                "--merge-output-format".into(),
                "mp4".into(),
            ]
        }
    }
}

/// Parse the payload of one progress template line.
///
/// Layout: `<status> <downloaded> <total> <estimate>`, with `NA` for fields
/// the engine does not know. Estimates may be fractional.
fn parse_progress(payload: &str) -> Option<ProgressEvent> {
    let mut fields = payload.split_whitespace();
    let status = fields.next()?;
    let downloaded = fields.next().and_then(parse_bytes);
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            bytes_done: downloaded.unwrap_or(0),
            bytes_total: total.or(estimate),
        }),
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

fn parse_bytes(field: &str) -> Option<u64> {
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

/// What we learned from the engine's output so far.
#[derive(Debug, Default)]
struct OutputState {
    file: Option<PathBuf>,
    title: Option<String>,
    last_error: Option<String>,
}

impl OutputState {
    fn consume(&mut self, line: &str, sink: &dyn ProgressSink) {
        let line = line.trim_end();
        if let Some(payload) = line.strip_prefix(PROGRESS_MARKER) {
            match parse_progress(payload) {
                Some(event) => sink.on_event(event),
                None => trace!(line, "Unrecognised progress line"),
            }
        } else if let Some(path) = line.strip_prefix(FILE_MARKER) {
            let path = path.trim();
            if !path.is_empty() && path != "NA" {
                self.file = Some(PathBuf::from(path));
            }
        } else if let Some(title) = line.strip_prefix(TITLE_MARKER) {
            let title = title.trim();
            if !title.is_empty() && title != "NA" {
                self.title = Some(title.to_string());
            }
        } else if let Some(message) = line.strip_prefix("ERROR:") {
            warn!(message = message.trim(), "yt-dlp reported an error");
            self.last_error = Some(message.trim().to_string());
        } else if !line.is_empty() {
            trace!(line, "yt-dlp output");
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(
        &self,
        request: &ExtractRequest,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<Extracted, ExtractError> {
        let args = self.build_args(request);
        info!(url = %request.url, format = %request.format, quality = %request.quality, "Starting yt-dlp");
        debug!(?args, "yt-dlp arguments");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::failed("failed to capture yt-dlp stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractError::failed("failed to capture yt-dlp stderr"))?;

        // Progress lands on stderr once --print makes the engine quiet, so
        // both streams are scanned for markers.
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);
        let mut state = OutputState::default();

        while !(out_done && err_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(url = %request.url, "yt-dlp cancelled");
                    let _ = child.kill().await;
                    return Err(ExtractError::Cancelled);
                }
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => state.consume(&line, sink),
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => state.consume(&line, sink),
                    None => err_done = true,
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(ExtractError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let message = state
                .last_error
                .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
            return Err(ExtractError::failed(message));
        }

        let path = resolve_artifact(&request.output_stem, request.format, state.file.as_deref()).await?;
        info!(path = %path.display(), "yt-dlp finished");
        Ok(Extracted {
            path,
            title: state.title,
        })
    }
}
