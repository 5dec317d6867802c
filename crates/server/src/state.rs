// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use jobwatch_core::{JobLedger, WatchBroker};
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, WatchSettings};
use crate::jobs::JobRunner;
use crate::watch::WatchConnections;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Authoritative job registry.
    pub ledger: Arc<JobLedger>,
    /// Runs job work and records its lifecycle in `ledger`.
    pub jobs: Arc<JobRunner>,
    pub watch: WatchSettings,
    pub connections: Arc<WatchConnections>,
    /// Fires on graceful shutdown; open watch connections close with 1001.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State with default settings and an empty ledger.
    pub fn new() -> Arc<Self> {
        Self::with_ledger(Arc::new(JobLedger::default()), WatchSettings::default())
    }

    pub fn with_ledger(ledger: Arc<JobLedger>, watch: WatchSettings) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs: Arc::new(JobRunner::new(Arc::clone(&ledger))),
            ledger,
            connections: Arc::new(WatchConnections::new(watch.max_connections)),
            watch,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Arc<Self> {
        let broker = Arc::new(WatchBroker::new(config.replay_buffer, config.subscriber_queue));
        let ledger = JobLedger::new(broker).with_history_retention(config.history_retention);
        Self::with_ledger(Arc::new(ledger), config.watch_settings())
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
