// crates/core/src/error.rs
use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Errors returned by ledger mutations.
///
/// These are local to the caller of the mutation; they never reach the
/// watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job {id} already finished with status {status}")]
    AlreadyFinished { id: JobId, status: JobStatus },

    #[error("Status {0} is not a terminal status")]
    NotTerminal(JobStatus),
}

impl LedgerError {
    pub fn already_finished(id: impl Into<JobId>, status: JobStatus) -> Self {
        Self::AlreadyFinished {
            id: id.into(),
            status,
        }
    }
}
