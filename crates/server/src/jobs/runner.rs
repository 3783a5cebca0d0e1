// crates/server/src/jobs/runner.rs
//! Runs extractions in the background.

use std::sync::Arc;

use mediadrop_core::filename::display_name;
use mediadrop_core::{ExtractError, ExtractRequest, Extractor};
use tracing::{error, info, Instrument};

use super::manager::JobLifecycleManager;
use super::types::{JobId, JobRequest, Outcome};

/// Failure reason recorded when the extraction task dies without returning.
const ABORTED_REASON: &str = "Failed to download: extraction aborted";

/// Spawns one task per job: extract, then finalize.
///
/// Callers get the job id back immediately and follow progress through the
/// lifecycle manager.
#[derive(Clone)]
pub struct JobRunner {
    manager: Arc<JobLifecycleManager>,
    extractor: Arc<dyn Extractor>,
}

impl JobRunner {
    pub fn new(manager: Arc<JobLifecycleManager>, extractor: Arc<dyn Extractor>) -> Self {
        Self { manager, extractor }
    }

    pub fn manager(&self) -> &Arc<JobLifecycleManager> {
        &self.manager
    }

    /// Create a job for `url` and start extracting it. `url` must already
    /// be validated.
    pub fn start(&self, url: impl Into<String>, request: JobRequest) -> JobId {
        let (id, reporter) = self.manager.create_job(request);
        let extract_request = ExtractRequest {
            url: url.into(),
            format: request.format,
            quality: request.quality,
            output_stem: self.manager.output_stem(id),
        };

        let manager = Arc::clone(&self.manager);
        let extractor = Arc::clone(&self.extractor);
        let span = tracing::info_span!("job", job_id = %id);

        // The extraction runs in its own task so a panicking engine still
        // leaves the job in a terminal state.
        tokio::spawn(
            async move {
                let cancel = reporter.cancellation();
                let extraction = tokio::spawn(
                    async move {
                        let result = extractor.extract(&extract_request, &reporter, cancel).await;
                        outcome_of(result, &extract_request)
                    }
                    .in_current_span(),
                );

                let outcome = match extraction.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(error = %e, "Extraction task aborted");
                        Outcome::failure(ABORTED_REASON)
                    }
                };

                if let Err(e) = manager.finalize(id, outcome).await {
                    error!(error = %e, "Failed to finalize job");
                }
            }
            .instrument(span),
        );

        id
    }
}

fn outcome_of(
    result: Result<mediadrop_core::Extracted, ExtractError>,
    request: &ExtractRequest,
) -> Outcome {
    match result {
        Ok(extracted) => Outcome::Success {
            display_name: display_name(extracted.title.as_deref(), request.format.extension()),
            path: extracted.path,
        },
        Err(e) => {
            if e.is_cancelled() {
                info!("Extraction stopped on request");
            }
            Outcome::failure(e.to_string())
        }
    }
}
