// crates/core/src/progress.rs
//! Progress events emitted by the extraction engine.

/// Highest percentage reported while a download is still in flight.
///
/// 100 is reserved for the terminal transition, after the artifact has been
/// located on disk.
pub const MAX_IN_FLIGHT_PERCENT: u8 = 99;

/// One progress hook call from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Bytes are arriving. `bytes_total` is `None` when the engine knows
    /// neither the exact size nor an estimate.
    Downloading {
        bytes_done: u64,
        bytes_total: Option<u64>,
    },
    /// The engine finished writing one file. Postprocessing (merging,
    /// audio conversion) may still follow.
    Finished,
}

impl ProgressEvent {
    /// Percent complete for a `Downloading` event, clamped to
    /// `0..=MAX_IN_FLIGHT_PERCENT`. `Finished` yields `None`.
    pub fn percent(&self) -> Option<u8> {
        match *self {
            Self::Downloading {
                bytes_done,
                bytes_total,
            } => Some(in_flight_percent(bytes_done, bytes_total.unwrap_or(0))),
            Self::Finished => None,
        }
    }
}

/// `floor(done * 100 / max(total, 1))`, clamped to the in-flight range.
pub fn in_flight_percent(bytes_done: u64, bytes_total: u64) -> u8 {
    let total = u128::from(bytes_total.max(1));
    let percent = u128::from(bytes_done) * 100 / total;
    percent.min(u128::from(MAX_IN_FLIGHT_PERCENT)) as u8
}

/// Receiver for progress events, implemented by the job lifecycle.
///
/// Called synchronously from whichever task reads the engine's output, so
/// implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}
