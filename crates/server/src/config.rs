//! Server configuration: command-line flags with environment fallbacks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use jobwatch_observability::LogFormat;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

/// Smallest resync interval the server can be configured to allow.
pub const RESYNC_FLOOR: Duration = Duration::from_secs(10);

/// Runtime settings for watch connections.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Interval between protocol-level pings.
    pub ping_interval: Duration,
    /// How long a ping may go unanswered before the connection is dropped.
    pub pong_timeout: Duration,
    /// Interval between BOOKMARK messages.
    pub bookmark_interval: Duration,
    /// Deadline for each outbound frame.
    pub write_timeout: Duration,
    /// Resync interval used when the client does not ask for one.
    pub default_resync: Duration,
    /// Lower bound applied to the client's requested resync interval.
    pub min_resync: Duration,
    /// Snapshot history size used when the client does not ask for one.
    pub default_history_limit: usize,
    /// Upper bound applied to the client's requested history size.
    pub max_history_limit: usize,
    /// Maximum concurrent watch connections per process.
    pub max_connections: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(10),
            bookmark_interval: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            default_resync: Duration::from_secs(30),
            min_resync: Duration::from_secs(10),
            default_history_limit: jobwatch_core::DEFAULT_HISTORY_LIMIT,
            max_history_limit: jobwatch_core::MAX_HISTORY_LIMIT,
            max_connections: 256,
        }
    }
}

/// Command-line configuration for `jobwatch-server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "jobwatch-server", version, about = "Job ledger with a resumable watch API")]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "JOBWATCH_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to bind.
    #[arg(long, env = "JOBWATCH_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Finished jobs kept in the ledger before the oldest is evicted.
    #[arg(long, env = "JOBWATCH_HISTORY_RETENTION", default_value_t = 500)]
    pub history_retention: usize,

    /// Events kept for resuming watchers.
    #[arg(long, env = "JOBWATCH_REPLAY_BUFFER", default_value_t = jobwatch_core::broker::DEFAULT_REPLAY_CAPACITY)]
    pub replay_buffer: usize,

    /// Per-watcher queue depth before a slow watcher is disconnected.
    #[arg(long, env = "JOBWATCH_SUBSCRIBER_QUEUE", default_value_t = jobwatch_core::broker::DEFAULT_QUEUE_CAPACITY)]
    pub subscriber_queue: usize,

    /// Maximum concurrent watch connections.
    #[arg(long, env = "JOBWATCH_MAX_CONNECTIONS", default_value_t = 256)]
    pub max_connections: usize,

    /// Seconds between WebSocket pings.
    #[arg(long, env = "JOBWATCH_PING_INTERVAL_SECS", default_value_t = 20)]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong.
    #[arg(long, env = "JOBWATCH_PONG_TIMEOUT_SECS", default_value_t = 10)]
    pub pong_timeout_secs: u64,

    /// Seconds between BOOKMARK messages.
    #[arg(long, env = "JOBWATCH_BOOKMARK_INTERVAL_SECS", default_value_t = 10)]
    pub bookmark_interval_secs: u64,

    /// Seconds allowed for each outbound write.
    #[arg(long, env = "JOBWATCH_WRITE_TIMEOUT_SECS", default_value_t = 10)]
    pub write_timeout_secs: u64,

    /// Minimum resync interval a client may request, in seconds. Values
    /// below 10 are raised to 10.
    #[arg(long, env = "JOBWATCH_MIN_RESYNC_SECS", default_value_t = 10)]
    pub min_resync_secs: u64,

    /// Log output format.
    #[arg(long, env = "JOBWATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs.max(1)),
            bookmark_interval: Duration::from_secs(self.bookmark_interval_secs.max(1)),
            write_timeout: Duration::from_secs(self.write_timeout_secs.max(1)),
            min_resync: Duration::from_secs(self.min_resync_secs).max(RESYNC_FLOOR),
            max_connections: self.max_connections,
            ..WatchSettings::default()
        }
    }
}
