// crates/server/src/jobs/runner.rs
//! Spawns job work and records its lifecycle in the ledger.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use jobwatch_core::{Job, JobId, JobLedger, JobStatus, LedgerError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::context::JobContext;
use super::types::{JobHandle, JobSpec};

/// Central job runner.
///
/// The ledger is the source of truth for status; the runner only tracks the
/// cancellation token of each job whose work is still executing.
pub struct JobRunner {
    ledger: Arc<JobLedger>,
    running: RwLock<HashMap<JobId, CancellationToken>>,
}

impl JobRunner {
    pub fn new(ledger: Arc<JobLedger>) -> Self {
        Self {
            ledger,
            running: RwLock::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<JobLedger> {
        &self.ledger
    }

    /// Register a queued job and spawn `f` for it.
    ///
    /// The job moves to `running` when the task starts. When `f` returns it
    /// becomes `succeeded` or `failed`, or `canceled` if its token fired.
    pub fn start_job<F, Fut>(self: &Arc<Self>, spec: JobSpec, f: F) -> Result<JobHandle, LedgerError>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let progress = spec.progress.clone();
        let job = spec.into_job(id.clone());
        let job_type = job.job_type.clone();
        self.ledger.create(job)?;

        let token = CancellationToken::new();
        match self.running.write() {
            Ok(mut running) => {
                running.insert(id.clone(), token.clone());
            }
            Err(e) => tracing::error!("RwLock poisoned writing running map: {e}"),
        }

        let ctx = JobContext::new(id.clone(), Arc::clone(&self.ledger), token.clone(), progress);
        let runner = Arc::clone(self);
        let task_id = id.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.ledger.start(&task_id) {
                // Canceled before the task got scheduled.
                tracing::debug!(job_id = %task_id, error = %e, "job not started");
                runner.forget(&task_id);
                return;
            }
            let outcome = f(ctx).await;
            runner.finish(&task_id, outcome, &task_token);
        });

        tracing::info!(job_id = %id, job_type = %job_type, "job started");
        Ok(JobHandle::new(id, token))
    }

    fn finish(&self, id: &str, outcome: Result<(), String>, token: &CancellationToken) {
        self.forget(id);
        let (status, error) = if token.is_cancelled() {
            (JobStatus::Canceled, None)
        } else {
            match outcome {
                Ok(()) => (JobStatus::Succeeded, None),
                Err(e) => (JobStatus::Failed, Some(e)),
            }
        };

        match self.ledger.terminate(id, status, error) {
            Ok(version) => tracing::info!(job_id = %id, %status, version, "job finished"),
            Err(LedgerError::AlreadyFinished { status, .. }) => {
                tracing::debug!(job_id = %id, %status, "job already finished");
            }
            Err(e) => tracing::warn!(job_id = %id, error = %e, "failed to record job outcome"),
        }
    }

    fn forget(&self, id: &str) -> Option<CancellationToken> {
        match self.running.write() {
            Ok(mut running) => running.remove(id),
            Err(e) => {
                tracing::error!("RwLock poisoned writing running map: {e}");
                None
            }
        }
    }

    /// Cancel a job: record `canceled` in the ledger now, then signal its work.
    ///
    /// Fails with `NotFound` for unknown ids and `AlreadyFinished` for jobs
    /// that reached a terminal status first.
    pub fn cancel(&self, id: &str) -> Result<Job, LedgerError> {
        self.ledger.terminate(id, JobStatus::Canceled, None)?;
        if let Some(token) = self.forget(id) {
            token.cancel();
        }
        tracing::info!(job_id = %id, "job canceled");
        self.ledger
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Jobs whose work is still executing.
    pub fn running_count(&self) -> usize {
        match self.running.read() {
            Ok(running) => running.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading running map: {e}");
                0
            }
        }
    }
}
