//! API route handlers for the jobwatch server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod watch;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/jobs - Active jobs
/// - POST /api/jobs - Start a simulated transfer
/// - GET  /api/jobs/history - Finished jobs
/// - GET  /api/jobs/snapshot - Versioned snapshot
/// - GET  /api/jobs/watch - WebSocket watch stream
/// - GET  /api/jobs/{id} - One job
/// - POST /api/jobs/{id}/cancel - Cancel a job
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", watch::router())
        .nest("/api", jobs::router())
        .merge(metrics::router())
        .with_state(state)
}
