//! Prometheus metrics.
//!
//! This module provides:
//! - Prometheus recorder initialization and rendering
//! - Metric descriptions
//! - Helpers for recording job and request metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded. Returns `false` if
/// a recorder was already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("mediadrop_requests_total", "Total number of API requests");
    describe_histogram!(
        "mediadrop_request_duration_seconds",
        "Duration of API requests in seconds"
    );

    describe_counter!("mediadrop_jobs_created_total", "Download jobs created, by format");
    describe_counter!(
        "mediadrop_jobs_finished_total",
        "Download jobs that reached a terminal status, by status and format"
    );
    describe_histogram!(
        "mediadrop_job_duration_seconds",
        "Time from job creation to its terminal status"
    );
    describe_counter!("mediadrop_jobs_cancelled_total", "Cancellation requests accepted");
    describe_gauge!("mediadrop_jobs_active", "Jobs not yet in a terminal status");
    describe_gauge!("mediadrop_job_records", "Job records currently held, finished ones included");

    describe_counter!(
        "mediadrop_artifacts_expired_total",
        "Artifacts deleted after their retention window"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a completed API request.
pub fn record_request(endpoint: &str, status: &str, duration: Duration) {
    counter!("mediadrop_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("mediadrop_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_job_created(format: &str) {
    counter!("mediadrop_jobs_created_total", "format" => format.to_string()).increment(1);
    gauge!("mediadrop_jobs_active").increment(1.0);
}

/// Record a job reaching `status` after `elapsed` since creation.
pub fn record_job_finished(status: &str, format: &str, elapsed: Duration) {
    counter!("mediadrop_jobs_finished_total", "status" => status.to_string(), "format" => format.to_string())
        .increment(1);
    histogram!("mediadrop_job_duration_seconds", "status" => status.to_string())
        .record(elapsed.as_secs_f64());
    gauge!("mediadrop_jobs_active").decrement(1.0);
}

pub fn record_job_cancelled() {
    counter!("mediadrop_jobs_cancelled_total").increment(1);
}

/// Set the number of records in the job table, sampled at scrape time.
pub fn record_job_table_size(records: usize) {
    gauge!("mediadrop_job_records").set(records as f64);
}

pub fn record_artifact_expired() {
    counter!("mediadrop_artifacts_expired_total").increment(1);
}

/// Helper for timing request handlers.
///
/// Usage:
/// ```ignore
/// let timer = RequestTimer::new("download");
/// // ... do work ...
/// timer.finish("202"); // or timer.finish_err(status_code)
/// ```
pub struct RequestTimer {
    endpoint: &'static str,
    start: Instant,
}

impl RequestTimer {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: Instant::now(),
        }
    }

    pub fn finish_err(self, status: u16) {
        record_request(self.endpoint, &status.to_string(), self.start.elapsed());
    }

    pub fn finish(self, status: &str) {
        record_request(self.endpoint, status, self.start.elapsed());
    }
}
