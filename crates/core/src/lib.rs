// crates/core/src/lib.rs
//! Media extraction plumbing shared by the mediadrop server.
//!
//! Everything that talks to the external `yt-dlp` engine lives here; the job
//! lifecycle itself is owned by the server crate and only reaches this crate
//! through the [`Extractor`] and [`ProgressSink`] seams.

pub mod artifact;
pub mod error;
pub mod extract;
pub mod filename;
pub mod progress;
pub mod request;

pub use error::*;
pub use extract::{ExtractRequest, Extracted, Extractor, YtDlpExtractor};
pub use filename::secure_filename;
pub use progress::*;
pub use request::*;
