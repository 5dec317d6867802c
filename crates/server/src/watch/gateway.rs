//! One watch connection, from first snapshot to close.
//!
//! The socket is split: a spawned task drains inbound frames and forwards
//! pongs over a channel, while the outbound loop multiplexes subscription
//! events with the ping, bookmark and resync timers. The inbound task ends by
//! dropping its sender, which the outbound loop reads as peer gone.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jobwatch_core::{JobLedger, Version, WatchMessage};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::params::WatchParams;
use crate::config::WatchSettings;

type WsSink = SplitSink<WebSocket, Message>;

/// Lifecycle of a watch connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Upgrade accepted, waiting for a connection slot.
    Connecting,
    /// Subscribed, initial snapshot being written.
    Open,
    /// Forwarding events and timers.
    Streaming,
    Closed,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Read failure or close frame from the peer.
    PeerClosed,
    PongTimeout,
    WriteFailed,
    WriteTimeout,
    /// The broker dropped the subscription for falling behind.
    Lagged,
    Encode,
    Shutdown,
}

impl CloseReason {
    /// Close frame to attempt on the way out, if the socket is still writable.
    fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            CloseReason::PeerClosed | CloseReason::WriteFailed | CloseReason::WriteTimeout => {
                return None
            }
            CloseReason::PongTimeout => (1001, "pong timeout"),
            CloseReason::Lagged => (1008, "subscriber lagged"),
            CloseReason::Encode => (1011, "encode failure"),
            CloseReason::Shutdown => (1001, "server shutting down"),
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

/// Serve one upgraded watch socket until it closes.
pub async fn serve_connection(
    socket: WebSocket,
    ledger: Arc<JobLedger>,
    settings: &WatchSettings,
    params: WatchParams,
    shutdown: CancellationToken,
) -> CloseReason {
    let conn_id = uuid::Uuid::new_v4().simple().to_string();

    let (mut sink, stream) = socket.split();

    let (snapshot, mut subscription) = ledger.watch(params.since, params.history_limit);
    let resume_ok = subscription.resume_ok();
    let mut snapshot_version = snapshot.version;
    tracing::info!(
        conn = %conn_id,
        phase = ?Phase::Open,
        since = params.since,
        resume_ok,
        version = snapshot_version,
        "watch connection open"
    );

    let initial = WatchMessage::initial_snapshot(snapshot, params.since, resume_ok);
    if let Err(reason) = send_message(&mut sink, &initial, settings.write_timeout).await {
        return close(sink, &conn_id, reason).await;
    }

    let (pong_tx, mut pong_rx) = mpsc::channel::<()>(8);
    let inbound = tokio::spawn(drain_inbound(stream, pong_tx));

    let start = Instant::now();
    let mut ping = ticker(start, settings.ping_interval);
    let mut bookmark = ticker(start, settings.bookmark_interval);
    let mut resync = ticker(start, params.resync_interval);
    let mut pong_deadline: Option<Instant> = None;

    tracing::debug!(conn = %conn_id, phase = ?Phase::Streaming, "streaming");
    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break CloseReason::Shutdown,

            signal = pong_rx.recv() => match signal {
                Some(()) => pong_deadline = None,
                None => break CloseReason::PeerClosed,
            },

            _ = tokio::time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                break CloseReason::PongTimeout;
            }

            _ = ping.tick() => {
                if let Err(reason) = send_frame(&mut sink, Message::Ping(vec![].into()), settings.write_timeout).await {
                    break reason;
                }
                pong_deadline.get_or_insert_with(|| Instant::now() + settings.pong_timeout);
            }

            _ = bookmark.tick() => {
                let message = WatchMessage::bookmark(ledger.current_version());
                if let Err(reason) = send_message(&mut sink, &message, settings.write_timeout).await {
                    break reason;
                }
            }

            _ = resync.tick() => {
                let snapshot = ledger.snapshot(params.history_limit);
                snapshot_version = snapshot.version;
                let message = WatchMessage::resync_snapshot(snapshot);
                if let Err(reason) = send_message(&mut sink, &message, settings.write_timeout).await {
                    break reason;
                }
            }

            event = subscription.recv() => match event {
                Some(event) if is_stale(event.version, snapshot_version) => {
                    tracing::trace!(conn = %conn_id, version = event.version, "skipping event covered by snapshot");
                }
                Some(event) => {
                    let message = WatchMessage::event(event);
                    if let Err(reason) = send_message(&mut sink, &message, settings.write_timeout).await {
                        break reason;
                    }
                }
                None => break CloseReason::Lagged,
            },
        }
    };

    subscription.cancel();
    inbound.abort();
    close(sink, &conn_id, reason).await
}

/// An event at or below the last snapshot version is already reflected in it.
fn is_stale(event_version: Version, snapshot_version: Version) -> bool {
    event_version <= snapshot_version
}

fn ticker(start: Instant, period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn drain_inbound(mut stream: SplitStream<WebSocket>, pongs: mpsc::Sender<()>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Pong(_)) => {
                if pongs.send(()).await.is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => return,
            // Pings are answered by axum; clients send nothing else.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "watch receive error");
                return;
            }
        }
    }
}

async fn send_message(
    sink: &mut WsSink,
    message: &WatchMessage,
    timeout: Duration,
) -> Result<(), CloseReason> {
    let text = message.to_json().map_err(|e| {
        tracing::error!(error = %e, "failed to encode watch message");
        CloseReason::Encode
    })?;
    send_frame(sink, Message::Text(text.into()), timeout).await?;
    counter!("jobwatch_watch_messages_total", "type" => message.type_name()).increment(1);
    Ok(())
}

async fn send_frame(sink: &mut WsSink, frame: Message, timeout: Duration) -> Result<(), CloseReason> {
    match tokio::time::timeout(timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "watch write failed");
            Err(CloseReason::WriteFailed)
        }
        Err(_) => Err(CloseReason::WriteTimeout),
    }
}

async fn close(mut sink: WsSink, conn_id: &str, reason: CloseReason) -> CloseReason {
    if let Some(frame) = reason.close_frame() {
        let _ = tokio::time::timeout(Duration::from_secs(1), sink.send(Message::Close(Some(frame)))).await;
    }
    tracing::info!(conn = %conn_id, phase = ?Phase::Closed, ?reason, "watch connection closed");
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_filter() {
        assert!(is_stale(5, 5));
        assert!(is_stale(3, 5));
        assert!(!is_stale(6, 5));
        assert!(!is_stale(1, 0));
    }

    #[test]
    fn test_close_frames() {
        assert!(CloseReason::PeerClosed.close_frame().is_none());
        assert!(CloseReason::WriteTimeout.close_frame().is_none());
        assert_eq!(CloseReason::Shutdown.close_frame().unwrap().code, 1001);
        assert_eq!(CloseReason::Lagged.close_frame().unwrap().code, 1008);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_skips_immediate_tick() {
        let start = Instant::now();
        let mut interval = ticker(start, Duration::from_secs(10));
        interval.tick().await;
        assert!(Instant::now() >= start + Duration::from_secs(10));
    }
}
