// crates/server/src/jobs/context.rs
//! Progress reporting handle handed to a running job.

use std::sync::Arc;

use jobwatch_core::{JobId, JobLedger, LedgerError, Progress, Version};
use tokio_util::sync::CancellationToken;

/// Owned by the job's future. Every change goes straight to the ledger, so
/// watchers see each step as a `MODIFIED` event.
pub struct JobContext {
    id: JobId,
    ledger: Arc<JobLedger>,
    cancel: CancellationToken,
    progress: Progress,
}

impl JobContext {
    pub(crate) fn new(
        id: JobId,
        ledger: Arc<JobLedger>,
        cancel: CancellationToken,
        progress: Progress,
    ) -> Self {
        Self {
            id,
            ledger,
            cancel,
            progress,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Set the completed count.
    pub fn report(&mut self, done: u64) -> Result<Version, LedgerError> {
        self.progress.done = done;
        self.push()
    }

    /// Add one to the completed count. Returns the new count.
    pub fn increment(&mut self) -> Result<u64, LedgerError> {
        self.progress.done += 1;
        self.push()?;
        Ok(self.progress.done)
    }

    pub fn set_total(&mut self, total: u64) -> Result<Version, LedgerError> {
        self.progress.total = total;
        self.push()
    }

    /// Set the human-readable progress note.
    pub fn note(&mut self, note: impl Into<String>) -> Result<Version, LedgerError> {
        self.progress.note = Some(note.into());
        self.push()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that fires when the job is canceled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn push(&self) -> Result<Version, LedgerError> {
        self.ledger.update_progress(&self.id, self.progress.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::{Job, JobStatus};

    fn context() -> (Arc<JobLedger>, JobContext) {
        let ledger = Arc::new(JobLedger::default());
        ledger
            .create(Job::new("job-1", "test", "Test").with_progress(Progress::new(5, "files")))
            .unwrap();
        let ctx = JobContext::new(
            "job-1".to_string(),
            Arc::clone(&ledger),
            CancellationToken::new(),
            Progress::new(5, "files"),
        );
        (ledger, ctx)
    }

    #[test]
    fn test_context_reports_to_ledger() {
        let (ledger, mut ctx) = context();

        assert_eq!(ctx.increment().unwrap(), 1);
        assert_eq!(ctx.increment().unwrap(), 2);
        ctx.note("halfway").unwrap();

        let job = ledger.get("job-1").unwrap();
        assert_eq!(job.progress.done, 2);
        assert_eq!(job.progress.note.as_deref(), Some("halfway"));
        assert_eq!(ledger.current_version(), 4);
    }

    #[test]
    fn test_context_rejects_finished_job() {
        let (ledger, mut ctx) = context();
        ledger.terminate("job-1", JobStatus::Canceled, None).unwrap();

        assert!(matches!(
            ctx.report(3),
            Err(LedgerError::AlreadyFinished { .. })
        ));
    }

    #[test]
    fn test_context_cancel_token() {
        let (_ledger, ctx) = context();
        assert!(!ctx.is_cancelled());
        ctx.cancel_token().cancel();
        assert!(ctx.is_cancelled());
    }
}
