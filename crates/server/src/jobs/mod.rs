// crates/server/src/jobs/mod.rs
//! Download job lifecycle.
//!
//! Provides:
//! - `JobStore` — the single shared table of job records
//! - `ProgressReporter` — sink the extraction engine feeds with events
//! - `ExpiryScheduler` — deferred artifact deletion and record purging
//! - `JobLifecycleManager` — creation, finalization, progress streams
//! - `JobRunner` — spawns extraction work off the request path

pub mod expiry;
pub mod manager;
pub mod reporter;
pub mod runner;
pub mod store;
pub mod stream;
pub mod types;

pub use expiry::{spawn_record_sweeper, ExpiryScheduler, TimerExpiryScheduler};
pub use manager::{JobLifecycleManager, ManagerConfig};
pub use reporter::ProgressReporter;
pub use runner::JobRunner;
pub use store::JobStore;
pub use types::{Job, JobError, JobId, JobRequest, JobStatus, JobUpdate, Outcome, ProgressUpdate};
