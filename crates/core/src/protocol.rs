//! Watch protocol types and the wire envelope.
//!
//! One [`WatchMessage`] is carried per WebSocket text frame:
//!
//! | `type`     | payload                                                   |
//! |------------|-----------------------------------------------------------|
//! | `SNAPSHOT` | `data: {version, active, history}`, `resume?`, `resync?`  |
//! | `EVENT`    | `data: {kind, version, job}`                              |
//! | `BOOKMARK` | `data: {version}`                                         |

use serde::{Deserialize, Serialize};

use crate::job::{Job, Version};

/// Complete point-in-time view of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: Version,
    pub active: Vec<Job>,
    pub history: Vec<Job>,
}

/// Kind of ledger mutation carried by a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
        }
    }
}

/// One ledger mutation, tagged with the version it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub version: Version,
    pub job: Job,
}

/// Heartbeat carrying only the current ledger version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub version: Version,
}

/// Tells the client whether its requested resume point was covered by replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub since: Version,
    pub ok: bool,
}

/// Wire envelope, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchMessage {
    Snapshot {
        data: Snapshot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume: Option<ResumeInfo>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        resync: bool,
    },
    Event {
        data: WatchEvent,
    },
    Bookmark {
        data: Bookmark,
    },
}

impl WatchMessage {
    /// The first snapshot on a connection, tagged with resume coverage.
    pub fn initial_snapshot(snapshot: Snapshot, since: Version, resume_ok: bool) -> Self {
        WatchMessage::Snapshot {
            data: snapshot,
            resume: Some(ResumeInfo {
                since,
                ok: resume_ok,
            }),
            resync: false,
        }
    }

    /// A periodic re-snapshot.
    pub fn resync_snapshot(snapshot: Snapshot) -> Self {
        WatchMessage::Snapshot {
            data: snapshot,
            resume: None,
            resync: true,
        }
    }

    pub fn event(event: WatchEvent) -> Self {
        WatchMessage::Event { data: event }
    }

    pub fn bookmark(version: Version) -> Self {
        WatchMessage::Bookmark {
            data: Bookmark { version },
        }
    }

    /// Version this message speaks for.
    pub fn version(&self) -> Version {
        match self {
            WatchMessage::Snapshot { data, .. } => data.version,
            WatchMessage::Event { data } => data.version,
            WatchMessage::Bookmark { data } => data.version,
        }
    }

    /// Wire tag, for logs and metric labels.
    pub fn type_name(&self) -> &'static str {
        match self {
            WatchMessage::Snapshot { .. } => "SNAPSHOT",
            WatchMessage::Event { .. } => "EVENT",
            WatchMessage::Bookmark { .. } => "BOOKMARK",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
