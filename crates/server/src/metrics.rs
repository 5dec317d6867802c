//! Prometheus metrics for the job ledger and the watch gateway.
//!
//! The core crate records through the `metrics` facade; this module installs
//! the recorder, describes every series and renders `/metrics`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
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
    describe_gauge!("jobwatch_ledger_version", "Current ledger version");
    describe_counter!(
        "jobwatch_ledger_mutations_total",
        "Ledger mutations by event kind"
    );
    describe_gauge!(
        "jobwatch_broker_subscribers",
        "Live subscribers registered with the watch broker"
    );
    describe_counter!(
        "jobwatch_broker_subscribers_evicted_total",
        "Subscribers disconnected for falling behind"
    );
    describe_gauge!("jobwatch_watch_connections", "Open watch WebSocket connections");
    describe_counter!(
        "jobwatch_watch_messages_total",
        "Messages written to watch connections by type"
    );
    describe_counter!("jobwatch_api_requests_total", "Total API requests");
    describe_histogram!(
        "jobwatch_api_request_duration_seconds",
        "Duration of API requests in seconds"
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
    counter!("jobwatch_api_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("jobwatch_api_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

/// Helper for timing request handlers.
///
/// ```ignore
/// let timer = RequestTimer::new("jobs_cancel");
/// // ... do work ...
/// timer.finish_ok(); // or timer.finish_err(status_code)
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

    pub fn finish_ok(self) {
        record_request(self.endpoint, "200", self.start.elapsed());
    }

    pub fn finish_err(self, status: u16) {
        record_request(self.endpoint, &status.to_string(), self.start.elapsed());
    }

    /// Finish with the outcome of a handler result.
    pub fn finish_result<T>(self, result: &crate::error::ApiResult<T>) {
        match result {
            Ok(_) => self.finish_ok(),
            Err(err) => {
                let status = match err {
                    crate::error::ApiError::JobNotFound(_) => 404,
                    crate::error::ApiError::Conflict(_) => 409,
                    crate::error::ApiError::BadRequest(_) => 400,
                    crate::error::ApiError::Internal(_) => 500,
                };
                self.finish_err(status)
            }
        }
    }
}
