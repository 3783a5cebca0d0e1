// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use mediadrop_core::{Extractor, YtDlpExtractor};

use crate::config::Config;
use crate::jobs::{ExpiryScheduler, JobLifecycleManager, JobRunner, JobStore, TimerExpiryScheduler};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: Config,
    /// Job table, streams, finalization.
    pub manager: Arc<JobLifecycleManager>,
    /// Starts extractions off the request path.
    pub runner: JobRunner,
    /// Pending artifact deletions; flushed on shutdown.
    pub expiry: TimerExpiryScheduler,
}

impl AppState {
    /// Wire up the job lifecycle around the `yt-dlp` engine from `config`.
    pub fn new(config: Config) -> Arc<Self> {
        let mut extractor = YtDlpExtractor::new(config.ytdlp_bin.clone());
        if let Some(cookies) = &config.cookies_file {
            extractor = extractor.with_cookies(cookies.clone());
        }
        Self::with_extractor(config, Arc::new(extractor))
    }

    /// Same as [`AppState::new`] with a caller-supplied engine.
    pub fn with_extractor(config: Config, extractor: Arc<dyn Extractor>) -> Arc<Self> {
        let store = Arc::new(JobStore::new());
        let expiry = TimerExpiryScheduler::new(Arc::clone(&store), config.purge_after_expiry);
        let manager = Arc::new(JobLifecycleManager::new(
            store,
            Arc::new(expiry.clone()) as Arc<dyn ExpiryScheduler>,
            config.manager_config(),
        ));
        let runner = JobRunner::new(Arc::clone(&manager), extractor);

        Arc::new(Self {
            start_time: Instant::now(),
            config,
            manager,
            runner,
            expiry,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
