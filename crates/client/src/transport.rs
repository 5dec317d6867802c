//! Reference-counted, reconnecting watch connection.
//!
//! One `WatchClient` keeps at most one WebSocket open no matter how many
//! local users call `start`. Every message is applied to a shared
//! [`JobsView`] in arrival order; listeners are notified after each change.
//! Any closure other than `stop`/final `release` schedules a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jobwatch_core::{JobsView, ResumeInfo, Version, WatchMessage};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::listeners::{ListenerHandle, ListenerRegistry};
use crate::store::VersionStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never started.
    Idle,
    Connecting,
    Open,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Torn down by `stop` or the last `release`.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Stopped,
    Lost,
}

#[derive(Default)]
struct Control {
    refs: usize,
    session: Option<CancellationToken>,
}

struct Inner {
    config: ClientConfig,
    store: Arc<dyn VersionStore>,
    view: RwLock<JobsView>,
    observed: AtomicU64,
    last_resume: Mutex<Option<ResumeInfo>>,
    listeners: ListenerRegistry,
    control: Mutex<Control>,
    state: watch::Sender<ConnectionState>,
}

/// Cheap to clone; clones share the connection and the view. A process
/// builds one and hands clones to every local consumer.
#[derive(Clone)]
pub struct WatchClient {
    inner: Arc<Inner>,
}

impl WatchClient {
    pub fn new(config: ClientConfig, store: Arc<dyn VersionStore>) -> Result<Self, ClientError> {
        config.watch_url(0)?;
        let view = JobsView::new().with_history_cap(config.history_cap());
        let (state, _) = watch::channel(ConnectionState::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                view: RwLock::new(view),
                observed: AtomicU64::new(0),
                last_resume: Mutex::new(None),
                listeners: ListenerRegistry::new(),
                control: Mutex::new(Control::default()),
                state,
            }),
        })
    }

    /// Take a reference on the connection, opening it if this is the first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut control = self.inner.control();
        control.refs += 1;
        if control.session.is_some() {
            return;
        }

        let token = CancellationToken::new();
        control.session = Some(token.clone());
        self.inner.state.send_replace(ConnectionState::Connecting);
        tokio::spawn(run(Arc::clone(&self.inner), token));
        tracing::info!(server = %self.inner.config.server_url, "watch client started");
    }

    /// Drop a reference; the connection closes when the last one goes.
    pub fn release(&self) {
        let mut control = self.inner.control();
        if control.refs == 0 {
            return;
        }
        control.refs -= 1;
        if control.refs == 0 {
            self.inner.teardown(&mut control);
        }
    }

    /// Close the connection regardless of outstanding references.
    /// No reconnect follows.
    pub fn stop(&self) {
        let mut control = self.inner.control();
        control.refs = 0;
        self.inner.teardown(&mut control);
    }

    pub fn ref_count(&self) -> usize {
        self.inner.control().refs
    }

    /// Copy of the current view.
    pub fn view(&self) -> JobsView {
        self.inner.read_view().clone()
    }

    /// Call `listener` with the view after every change.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&JobsView) + Send + Sync + 'static,
    {
        self.inner.listeners.register(listener)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Highest version seen in any message since the last snapshot.
    pub fn observed_version(&self) -> Version {
        self.inner.observed.load(Ordering::Acquire)
    }

    /// Resume outcome reported by the most recent connection.
    pub fn last_resume(&self) -> Option<ResumeInfo> {
        *self.inner.last_resume.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Version the next connection will resume from.
    pub fn resume_version(&self) -> Version {
        self.inner.resume_version()
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| {
            tracing::error!("watch client control mutex poisoned, recovering");
            e.into_inner()
        })
    }

    fn read_view(&self) -> RwLockReadGuard<'_, JobsView> {
        self.view.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_view(&self) -> RwLockWriteGuard<'_, JobsView> {
        self.view.write().unwrap_or_else(|e| e.into_inner())
    }

    fn teardown(&self, control: &mut Control) {
        if let Some(token) = control.session.take() {
            token.cancel();
            self.state.send_replace(ConnectionState::Stopped);
            tracing::info!("watch client stopped");
        }
    }

    /// Publish `state` unless this session was already torn down.
    fn publish_state(&self, token: &CancellationToken, state: ConnectionState) {
        let _control = self.control();
        if !token.is_cancelled() {
            self.state.send_replace(state);
        }
    }

    fn resume_version(&self) -> Version {
        let persisted = match self.store.load() {
            Ok(version) => version.unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load persisted watch version");
                0
            }
        };
        self.read_view().version().max(persisted)
    }

    async fn stream(&self, ws: WsStream, token: &CancellationToken) -> StreamEnd {
        let (mut sink, mut stream) = ws.split();
        loop {
            let frame = tokio::select! {
                _ = token.cancelled() => {
                    let _ = tokio::time::timeout(Duration::from_secs(1), sink.send(Message::Close(None))).await;
                    return StreamEnd::Stopped;
                }
                frame = tokio::time::timeout(self.config.idle_timeout, stream.next()) => frame,
            };

            match frame {
                Err(_) => {
                    tracing::warn!(
                        idle_ms = self.config.idle_timeout.as_millis() as u64,
                        "watch connection idle"
                    );
                    return StreamEnd::Lost;
                }
                Ok(None) => {
                    tracing::info!("watch connection ended");
                    return StreamEnd::Lost;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "watch read failed");
                    return StreamEnd::Lost;
                }
                Ok(Some(Ok(Message::Text(text)))) => self.handle_text(&text),
                Ok(Some(Ok(Message::Close(frame)))) => {
                    tracing::info!(?frame, "server closed watch connection");
                    return StreamEnd::Lost;
                }
                // Pongs are queued by tungstenite and flushed on the next read.
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let message = match WatchMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed watch message");
                return;
            }
        };

        let version = message.version();
        let is_snapshot = matches!(message, WatchMessage::Snapshot { .. });
        if let WatchMessage::Snapshot {
            resume: Some(resume),
            ..
        } = &message
        {
            *self.last_resume.lock().unwrap_or_else(|e| e.into_inner()) = Some(*resume);
        }

        let applied = self.write_view().apply_message(message);
        self.observe(version, is_snapshot);

        if applied.changed() {
            let view = self.read_view().clone();
            self.listeners.notify(&view);
        }
    }

    /// Track the highest version seen and persist it. A snapshot resets the
    /// mark, so a restarted server with fresh versions is followed down.
    fn observe(&self, version: Version, is_snapshot: bool) {
        let previous = if is_snapshot {
            self.observed.swap(version, Ordering::AcqRel)
        } else {
            self.observed.fetch_max(version, Ordering::AcqRel)
        };
        let current = self.observed.load(Ordering::Acquire);
        if current != previous {
            if let Err(e) = self.store.save(current) {
                tracing::warn!(error = %e, version = current, "failed to persist watch version");
            }
        }
    }
}

async fn run(inner: Arc<Inner>, token: CancellationToken) {
    let mut backoff = Backoff::new(inner.config.backoff.clone());
    loop {
        inner.publish_state(&token, ConnectionState::Connecting);
        let since = inner.resume_version();

        let end = match connect(&inner.config, since, &token).await {
            Ok(Some(ws)) => {
                backoff.reset();
                inner.publish_state(&token, ConnectionState::Open);
                tracing::info!(since, "watch connected");
                inner.stream(ws, &token).await
            }
            Ok(None) => StreamEnd::Stopped,
            Err(e) => {
                tracing::warn!(error = %e, attempt = backoff.attempt(), "watch connect failed");
                StreamEnd::Lost
            }
        };
        if end == StreamEnd::Stopped {
            return;
        }

        let delay = backoff.next_delay();
        inner.publish_state(&token, ConnectionState::Reconnecting);
        tracing::warn!(
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "watch reconnecting"
        );
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Open one connection. `Ok(None)` when canceled first; a pending connect
/// is dropped on timeout.
async fn connect(
    config: &ClientConfig,
    since: Version,
    token: &CancellationToken,
) -> Result<Option<WsStream>, ClientError> {
    let url = config.watch_url(since)?;
    tokio::select! {
        _ = token.cancelled() => Ok(None),
        result = tokio::time::timeout(config.connect_timeout, connect_async(url)) => match result {
            Ok(Ok((ws, _response))) => Ok(Some(ws)),
            Ok(Err(e)) => Err(ClientError::Connect(Box::new(e))),
            Err(_) => Err(ClientError::ConnectTimeout(config.connect_timeout)),
        },
    }
}
