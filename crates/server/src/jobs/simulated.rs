// crates/server/src/jobs/simulated.rs
//! Demo workload: a transfer that advances one unit per step.

use std::time::Duration;

use super::context::JobContext;

/// Advance from zero to the job's total, one unit every `step`.
///
/// Stops early when canceled. With `fail_at`, returns an error once that
/// many units are done.
pub async fn simulated_transfer(
    mut ctx: JobContext,
    step: Duration,
    fail_at: Option<u64>,
) -> Result<(), String> {
    let cancel = ctx.cancel_token();
    let total = ctx.progress().total;

    for done in 1..=total {
        tokio::select! {
            _ = cancel.cancelled() => return Err("canceled".to_string()),
            _ = tokio::time::sleep(step) => {}
        }
        ctx.report(done).map_err(|e| e.to_string())?;
        if fail_at == Some(done) {
            return Err(format!("transfer failed after {done} {}", ctx.progress().unit));
        }
    }

    ctx.note("complete").map_err(|e| e.to_string())?;
    Ok(())
}
