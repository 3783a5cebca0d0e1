// crates/core/src/request.rs
//! Download request types: output format and quality selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::RequestError;

/// Output container the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Audio only, transcoded to MP3 by the engine's postprocessor.
    Mp3,
    /// Video with audio, merged into an MP4 container.
    Mp4,
}

impl MediaFormat {
    /// File extension of the finished artifact.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MediaFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp3" => Ok(Self::Mp3),
            "mp4" => Ok(Self::Mp4),
            other => Err(RequestError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Requested video quality.
///
/// Serialized as `"best"` or the maximum height as a string (`"720"`).
/// Only meaningful for [`MediaFormat::Mp4`]; audio downloads ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    #[default]
    Best,
    /// Upper bound on the video height in pixels.
    MaxHeight(u32),
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => f.write_str("best"),
            Self::MaxHeight(h) => write!(f, "{h}"),
        }
    }
}

impl FromStr for Quality {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("best") {
            return Ok(Self::Best);
        }
        let digits = s.strip_suffix('p').unwrap_or(s);
        match digits.parse::<u32>() {
            Ok(h) if h > 0 => Ok(Self::MaxHeight(h)),
            _ => Err(RequestError::InvalidQuality(s.to_string())),
        }
    }
}

impl Serialize for Quality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Height(u32),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Height(0) => Err(serde::de::Error::custom("quality must be positive")),
            Raw::Height(h) => Ok(Self::MaxHeight(h)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Check that `url` is something we are willing to hand to the engine.
///
/// Only absolute http(s) URLs with a non-empty host are accepted, which also
/// rules out values the engine would parse as command-line options.
pub fn validate_url(url: &str) -> Result<&str, RequestError> {
    let url = url.trim();
    let invalid = || RequestError::InvalidUrl(url.to_string());
    if url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    match parsed.scheme() {
        "http" | "https" if has_host => Ok(url),
        _ => Err(invalid()),
    }
}
