//! Query parameters of `GET /api/jobs/watch`.

use std::time::Duration;

use jobwatch_core::Version;
use serde::Deserialize;

use crate::config::WatchSettings;

/// Raw query string. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchQuery {
    /// Last version the client applied; 0 asks for no replay.
    pub since: Option<Version>,
    /// Snapshot history size.
    pub history_limit: Option<usize>,
    /// Resync interval in seconds.
    pub resync: Option<u64>,
}

/// Shortest timer period a connection will run. Tokio intervals reject zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Parameters after defaults and clamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchParams {
    pub since: Version,
    pub history_limit: usize,
    pub resync_interval: Duration,
}

impl WatchParams {
    pub fn resolve(query: &WatchQuery, settings: &WatchSettings) -> Self {
        let history_limit = query
            .history_limit
            .unwrap_or(settings.default_history_limit)
            .min(settings.max_history_limit);
        let resync_interval = query
            .resync
            .map(Duration::from_secs)
            .unwrap_or(settings.default_resync)
            .max(settings.min_resync)
            .max(MIN_PERIOD);

        Self {
            since: query.since.unwrap_or(0),
            history_limit,
            resync_interval,
        }
    }
}
