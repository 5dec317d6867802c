// crates/server/src/routes/jobs.rs
//! API routes for jobs.
//!
//! - GET  /jobs                 active jobs, newest first
//! - GET  /jobs/history         finished jobs, newest first
//! - GET  /jobs/snapshot        versioned snapshot of both lists
//! - GET  /jobs/{id}            one job
//! - POST /jobs                 start a simulated transfer
//! - POST /jobs/{id}/cancel     cancel a live job

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use jobwatch_core::{Job, Snapshot};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::jobs::simulated::simulated_transfer;
use crate::jobs::types::StartTransferRequest;
use crate::jobs::{JobSpec, MAX_TRANSFER_STEPS, MIN_STEP_MS};
use crate::metrics::RequestTimer;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub history_limit: Option<usize>,
}

/// GET /api/jobs
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.ledger.list_active())
}

/// GET /api/jobs/history?limit=N
async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Job>> {
    Json(state.ledger.list_history(query.limit))
}

/// GET /api/jobs/snapshot?history_limit=N
async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Json<Snapshot> {
    let limit = query
        .history_limit
        .unwrap_or(state.watch.default_history_limit)
        .min(state.watch.max_history_limit);
    Json(state.ledger.snapshot(limit))
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .ledger
        .get(&id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// POST /api/jobs/{id}/cancel
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let timer = RequestTimer::new("jobs_cancel");
    let result = state.jobs.cancel(&id).map(Json).map_err(ApiError::from);
    timer.finish_result(&result);
    result
}

/// POST /api/jobs: start a simulated transfer. Responds 202 with the
/// queued job; progress arrives over the watch stream.
async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartTransferRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let timer = RequestTimer::new("jobs_start");
    let result = start_transfer(&state, req);
    timer.finish_result(&result);
    result
}

fn start_transfer(state: &AppState, req: StartTransferRequest) -> ApiResult<(StatusCode, Json<Job>)> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if req.total > MAX_TRANSFER_STEPS {
        return Err(ApiError::BadRequest(format!(
            "total must be at most {MAX_TRANSFER_STEPS}"
        )));
    }
    if req.fail_at.is_some_and(|n| n == 0 || n > req.total) {
        return Err(ApiError::BadRequest(format!(
            "fail_at must be within 1..={}",
            req.total
        )));
    }

    let step = Duration::from_millis(req.step_ms.max(MIN_STEP_MS));
    let fail_at = req.fail_at;
    let spec = JobSpec::new(req.job_type, req.title).with_total(req.total, req.unit);
    let handle = state
        .jobs
        .start_job(spec, move |ctx| simulated_transfer(ctx, step, fail_at))?;

    let job = state
        .ledger
        .get(&handle.id)
        .ok_or_else(|| ApiError::Internal(format!("job {} vanished after start", handle.id)))?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs).post(start_job))
        .route("/jobs/history", get(list_history))
        .route("/jobs/snapshot", get(get_snapshot))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use jobwatch_core::{JobStatus, Progress};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/api", router()).with_state(state)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_list_jobs_empty() {
        let (status, json) = send(app(AppState::new()), Method::GET, "/api/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_snapshot_and_history() {
        let state = AppState::new();
        state
            .ledger
            .create(Job::new("a", "t", "A").with_progress(Progress::new(2, "files")))
            .unwrap();
        state.ledger.create(Job::new("b", "t", "B")).unwrap();
        state.ledger.terminate("b", JobStatus::Succeeded, None).unwrap();

        let (status, json) = send(app(state.clone()), Method::GET, "/api/jobs/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["version"], 3);
        assert_eq!(json["active"][0]["id"], "a");
        assert_eq!(json["history"][0]["id"], "b");

        let (_, json) = send(app(state.clone()), Method::GET, "/api/jobs/snapshot?history_limit=0", None).await;
        assert_eq!(json["history"], serde_json::json!([]));

        let (_, json) = send(app(state), Method::GET, "/api/jobs/history?limit=5", None).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["status"], "succeeded");
    }

    #[tokio::test]
    async fn test_get_job() {
        let state = AppState::new();
        state.ledger.create(Job::new("a", "file_transfer", "A")).unwrap();

        let (status, json) = send(app(state.clone()), Method::GET, "/api/jobs/a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["type"], "file_transfer");

        let (status, json) = send(app(state), Method::GET, "/api/jobs/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Job not found");
    }

    #[tokio::test]
    async fn test_cancel_job() {
        let state = AppState::new();
        state.ledger.create(Job::new("a", "t", "A")).unwrap();

        let (status, json) = send(app(state.clone()), Method::POST, "/api/jobs/a/cancel", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "canceled");

        let (status, json) = send(app(state.clone()), Method::POST, "/api/jobs/a/cancel", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "Conflict");

        let (status, _) = send(app(state), Method::POST, "/api/jobs/nope/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_job_accepted() {
        let state = AppState::new();
        let (status, json) = send(
            app(state.clone()),
            Method::POST,
            "/api/jobs",
            Some(r#"{"title":"Copy photos","total":2,"step_ms":1}"#),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["title"], "Copy photos");
        assert_eq!(json["progress"]["total"], 2);

        let id = json["id"].as_str().unwrap().to_string();
        for _ in 0..100 {
            if state.ledger.get(&id).unwrap().status == JobStatus::Succeeded {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("simulated transfer never finished");
    }

    #[tokio::test]
    async fn test_start_job_validation() {
        let (status, _) = send(
            app(AppState::new()),
            Method::POST,
            "/api/jobs",
            Some(r#"{"title":"  "}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app(AppState::new()),
            Method::POST,
            "/api/jobs",
            Some(r#"{"title":"x","total":3,"fail_at":9}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            app(AppState::new()),
            Method::POST,
            "/api/jobs",
            Some(r#"{"title":"x","total":100000000,"step_ms":0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["details"].as_str().unwrap().contains("total"));
    }

    #[tokio::test]
    async fn test_start_job_step_has_floor() {
        let state = AppState::new();
        let (status, json) = send(
            app(state.clone()),
            Method::POST,
            "/api/jobs",
            Some(r#"{"title":"Fast","total":3,"step_ms":0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        // three steps at the floor take at least 30ms
        tokio::time::sleep(Duration::from_millis(5)).await;
        let id = json["id"].as_str().unwrap();
        assert!(state.ledger.get(id).unwrap().status.is_active());
    }
}
