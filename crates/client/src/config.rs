//! Client configuration.

use std::time::Duration;

use jobwatch_core::{Version, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

use crate::backoff::BackoffPolicy;
use crate::error::ClientError;

/// Path of the watch endpoint on the server.
pub const WATCH_PATH: &str = "/api/jobs/watch";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://127.0.0.1:47900` or `ws://host:port`.
    pub server_url: String,
    /// Snapshot history size to request; server default when `None`.
    pub history_limit: Option<usize>,
    /// Resync interval to request, in seconds; server default when `None`.
    pub resync_secs: Option<u64>,
    pub backoff: BackoffPolicy,
    /// A connection that delivers no frame for this long is considered dead.
    pub idle_timeout: Duration,
    /// A connect attempt still pending after this long is abandoned.
    pub connect_timeout: Duration,
    /// Keep at most this many finished jobs in the local view. Defaults to
    /// the snapshot history size, so event-fed history never outgrows what a
    /// fresh snapshot would carry.
    pub view_history_cap: Option<usize>,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            history_limit: None,
            resync_secs: None,
            backoff: BackoffPolicy::default(),
            idle_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            view_history_cap: None,
        }
    }

    /// History cap for the local view.
    pub fn history_cap(&self) -> usize {
        self.view_history_cap.unwrap_or_else(|| {
            self.history_limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .min(MAX_HISTORY_LIMIT)
        })
    }

    /// Full watch URL resuming from `since`.
    pub fn watch_url(&self, since: Version) -> Result<String, ClientError> {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ClientError::InvalidUrl(self.server_url.clone()));
        };

        let mut url = format!("{base}{WATCH_PATH}?since={since}");
        if let Some(limit) = self.history_limit {
            url.push_str(&format!("&history_limit={limit}"));
        }
        if let Some(resync) = self.resync_secs {
            url.push_str(&format!("&resync={resync}"));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_url_from_http() {
        let config = ClientConfig::new("http://127.0.0.1:47900/");
        assert_eq!(
            config.watch_url(12).unwrap(),
            "ws://127.0.0.1:47900/api/jobs/watch?since=12"
        );
    }

    #[test]
    fn test_watch_url_with_options() {
        let config = ClientConfig {
            history_limit: Some(20),
            resync_secs: Some(60),
            ..ClientConfig::new("wss://jobs.example.com")
        };
        assert_eq!(
            config.watch_url(0).unwrap(),
            "wss://jobs.example.com/api/jobs/watch?since=0&history_limit=20&resync=60"
        );
    }

    #[test]
    fn test_history_cap_follows_snapshot_size() {
        let config = ClientConfig::new("http://h");
        assert_eq!(config.history_cap(), DEFAULT_HISTORY_LIMIT);

        let config = ClientConfig {
            history_limit: Some(5),
            ..ClientConfig::new("http://h")
        };
        assert_eq!(config.history_cap(), 5);

        let config = ClientConfig {
            history_limit: Some(50_000),
            ..ClientConfig::new("http://h")
        };
        assert_eq!(config.history_cap(), MAX_HISTORY_LIMIT);

        let config = ClientConfig {
            history_limit: Some(5),
            view_history_cap: Some(20),
            ..ClientConfig::new("http://h")
        };
        assert_eq!(config.history_cap(), 20);
    }

    #[test]
    fn test_watch_url_rejects_unknown_scheme() {
        let config = ClientConfig::new("ftp://host");
        assert!(matches!(config.watch_url(0), Err(ClientError::InvalidUrl(_))));
    }
}
