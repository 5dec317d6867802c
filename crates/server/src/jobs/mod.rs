// crates/server/src/jobs/mod.rs
//! Background job execution on top of the ledger.
//!
//! - `JobRunner` spawns work, records lifecycle transitions and cancels jobs
//! - `JobContext` is the work's handle for reporting progress
//! - `JobSpec` / `JobHandle` describe a job going in and coming out
//! - `simulated` holds the demo transfer workload behind `POST /api/jobs`

pub mod context;
pub mod runner;
pub mod simulated;
pub mod types;

pub use context::JobContext;
pub use runner::JobRunner;
pub use types::{JobHandle, JobSpec, MAX_TRANSFER_STEPS, MIN_STEP_MS};
