// crates/server/src/routes/health.rs
//! Liveness plus a glance at ledger and watcher load.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use jobwatch_core::Version;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// `ok`, or `draining` once shutdown has begun.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Version of the most recent ledger mutation.
    pub ledger_version: Version,
    pub active_jobs: usize,
    pub watch_connections: usize,
}

impl HealthResponse {
    fn from_state(state: &AppState) -> Self {
        let status = if state.shutdown.is_cancelled() {
            "draining"
        } else {
            "ok"
        };
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.uptime_secs(),
            ledger_version: state.ledger.current_version(),
            active_jobs: state.ledger.list_active().len(),
            watch_connections: state.connections.active(),
        }
    }
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::from_state(&state))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::Job;

    #[test]
    fn test_reports_ledger_load() {
        let state = AppState::new();
        state.ledger.create(Job::new("a", "file_transfer", "A")).unwrap();
        state.ledger.create(Job::new("b", "file_transfer", "B")).unwrap();
        let _slot = state.connections.try_acquire().unwrap();

        let health = HealthResponse::from_state(&state);
        assert_eq!(health.status, "ok");
        assert_eq!(health.ledger_version, 2);
        assert_eq!(health.active_jobs, 2);
        assert_eq!(health.watch_connections, 1);
    }

    #[test]
    fn test_draining_after_shutdown() {
        let state = AppState::new();
        state.shutdown.cancel();
        assert_eq!(HealthResponse::from_state(&state).status, "draining");
    }
}
