// crates/server/src/jobs/types.rs
//! Types for the background job system.

use jobwatch_core::{Job, JobId, Progress};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Description of a job about to be started.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: String,
    pub title: String,
    pub progress: Progress,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl JobSpec {
    pub fn new(job_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            title: title.into(),
            progress: Progress::default(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_total(mut self, total: u64, unit: impl Into<String>) -> Self {
        self.progress = Progress::new(total, unit);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub(crate) fn into_job(self, id: JobId) -> Job {
        let mut job = Job::new(id, self.job_type, self.title).with_progress(self.progress);
        job.metadata = self.metadata;
        job
    }
}

/// Handle to a started job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: JobId,
    cancel: CancellationToken,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, cancel: CancellationToken) -> Self {
        Self { id, cancel }
    }

    /// Signal the work to stop. The ledger records `canceled` once the work
    /// returns; use `JobRunner::cancel` to record it immediately.
    pub fn signal_cancel(&self) {
        self.cancel.cancel();
    }
}

/// Largest `total` a simulated transfer may request.
pub const MAX_TRANSFER_STEPS: u64 = 10_000;

/// Shortest delay between simulated progress steps.
pub const MIN_STEP_MS: u64 = 10;

/// Body of `POST /api/jobs`: a simulated transfer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StartTransferRequest {
    #[serde(default = "default_job_type", rename = "type")]
    pub job_type: String,
    pub title: String,
    #[serde(default = "default_total")]
    pub total: u64,
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Delay between progress steps, raised to [`MIN_STEP_MS`].
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// Fail the transfer once this many units are done.
    #[serde(default)]
    pub fail_at: Option<u64>,
}

fn default_job_type() -> String {
    "file_transfer".to_string()
}

fn default_total() -> u64 {
    10
}

fn default_unit() -> String {
    "files".to_string()
}

fn default_step_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::JobStatus;

    #[test]
    fn test_spec_into_job() {
        let job = JobSpec::new("file_transfer", "Copy A")
            .with_total(10, "files")
            .with_metadata("source", serde_json::json!("/tmp/a"))
            .into_job("job-1".to_string());

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress.total, 10);
        assert_eq!(job.progress.unit, "files");
        assert_eq!(job.metadata["source"], "/tmp/a");
    }

    #[test]
    fn test_start_request_defaults() {
        let req: StartTransferRequest = serde_json::from_str(r#"{"title":"Copy"}"#).unwrap();
        assert_eq!(req.job_type, "file_transfer");
        assert_eq!(req.total, 10);
        assert_eq!(req.unit, "files");
        assert_eq!(req.step_ms, 200);
        assert!(req.fail_at.is_none());
    }

    #[test]
    fn test_job_handle_signal() {
        let token = CancellationToken::new();
        let handle = JobHandle::new("job-1".to_string(), token.clone());
        handle.signal_cancel();
        assert!(token.is_cancelled());
    }
}
