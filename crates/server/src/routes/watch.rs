// crates/server/src/routes/watch.rs
//! GET /jobs/watch: WebSocket list-watch stream.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::watch::{serve_connection, Phase, WatchParams, WatchQuery};

/// Close code sent when every watch slot is taken ("try again later").
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Upgrade to a watch socket.
///
/// The connection slot is claimed inside the upgrade callback so that the
/// claim and its release always run in the same task.
async fn watch_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let params = WatchParams::resolve(&query, &state.watch);

    ws.on_upgrade(move |mut socket| async move {
        tracing::debug!(phase = ?Phase::Connecting, since = params.since, "watch upgrade");
        let _guard = match state.connections.try_acquire() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting watch connection");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_TRY_AGAIN_LATER,
                        reason: "Connection limit exceeded".into(),
                    })))
                    .await;
                return;
            }
        };

        serve_connection(
            socket,
            Arc::clone(&state.ledger),
            &state.watch,
            params,
            state.shutdown.clone(),
        )
        .await;
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs/watch", get(watch_handler))
}
