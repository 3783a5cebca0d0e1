// crates/core/src/artifact.rs
//! Locating finished artifacts and sweeping partial ones.

use std::path::{Path, PathBuf};

use crate::error::ExtractError;
use crate::request::MediaFormat;

/// Find the file the engine actually produced.
///
/// The engine may rename its output during postprocessing (audio extraction
/// swaps the extension), so the expected `<stem>.<ext>` path is tried first,
/// then the path the engine reported after moving the file.
pub async fn resolve_artifact(
    stem: &Path,
    format: MediaFormat,
    reported: Option<&Path>,
) -> Result<PathBuf, ExtractError> {
    let expected = stem.with_extension(format.extension());
    if is_file(&expected).await {
        return Ok(expected);
    }

    if let Some(reported) = reported {
        if is_file(reported).await {
            tracing::debug!(
                expected = %expected.display(),
                actual = %reported.display(),
                "Artifact found at engine-reported path"
            );
            return Ok(reported.to_path_buf());
        }
    }

    Err(ExtractError::ArtifactMissing {
        format: format.extension().to_ascii_uppercase(),
        path: expected,
    })
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Delete every file in `dir` whose name starts with `<prefix>.`.
///
/// Used to clear half-written downloads (`<id>.mp4.part`, `<id>.f137.mp4`,
/// ...) after a failed job. Returns how many files were removed; individual
/// removal failures are logged and skipped.
pub async fn purge_partials(dir: &Path, prefix: &str) -> std::io::Result<usize> {
    let needle = format!("{prefix}.");
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(&needle) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial download");
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_expected_extension() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("job1");
        std::fs::write(stem.with_extension("mp3"), b"id3").unwrap();

        let path = resolve_artifact(&stem, MediaFormat::Mp3, None).await.unwrap();
        assert_eq!(path, dir.path().join("job1.mp3"));
    }

    #[tokio::test]
    async fn falls_back_to_reported_path() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("job2");
        let reported = dir.path().join("job2.mkv");
        std::fs::write(&reported, b"matroska").unwrap();

        let path = resolve_artifact(&stem, MediaFormat::Mp4, Some(&reported))
            .await
            .unwrap();
        assert_eq!(path, reported);
    }

    #[tokio::test]
    async fn missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("job3");
        // Only the pre-conversion file exists.
        std::fs::write(stem.with_extension("webm"), b"webm").unwrap();

        let err = resolve_artifact(&stem, MediaFormat::Mp3, None)
            .await
            .unwrap_err();
        match err {
            ExtractError::ArtifactMissing { format, path } => {
                assert_eq!(format, "MP3");
                assert_eq!(path, dir.path().join("job3.mp3"));
            }
            other => panic!("expected ArtifactMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn purge_partials_only_touches_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["abc.mp4.part", "abc.f137.mp4", "abcd.mp4", "other.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed = purge_partials(dir.path(), "abc").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("abc.mp4.part").exists());
        assert!(!dir.path().join("abc.f137.mp4").exists());
        assert!(dir.path().join("abcd.mp4").exists());
        assert!(dir.path().join("other.mp3").exists());
    }
}
