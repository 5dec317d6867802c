//! Client-side reconciliation of snapshots and events into a local view.
//!
//! Snapshots are authoritative and replace the view wholesale. Events are
//! upserts keyed by job id, routed to the active or history map by status,
//! and dropped when older than the view's version. Applying the same event
//! twice has no additional effect.

use std::collections::HashMap;

use crate::job::{sort_newest_first, Job, JobId, Version};
use crate::protocol::{EventKind, Snapshot, WatchEvent, WatchMessage};

/// Outcome of applying one input to a [`JobsView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The view was replaced or updated.
    Changed,
    /// The input was older than the view and was discarded.
    Stale,
    /// The input carries no job state (bookmarks).
    Ignored,
}

impl Applied {
    pub fn changed(self) -> bool {
        self == Applied::Changed
    }
}

/// Local `{version, active, history}` state rebuilt from the watch stream.
#[derive(Debug, Clone, Default)]
pub struct JobsView {
    version: Version,
    active_map: HashMap<JobId, Job>,
    history_map: HashMap<JobId, Job>,
    active: Vec<Job>,
    history: Vec<Job>,
    history_cap: Option<usize>,
}

impl JobsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the newest `cap` finished jobs in the view.
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = Some(cap);
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Active jobs, newest first.
    pub fn active(&self) -> &[Job] {
        &self.active
    }

    /// Finished jobs, newest first.
    pub fn history(&self) -> &[Job] {
        &self.history
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.active_map.get(id).or_else(|| self.history_map.get(id))
    }

    /// Current state as a snapshot value.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            active: self.active.clone(),
            history: self.history.clone(),
        }
    }

    /// Replace local state unconditionally.
    pub fn apply_snapshot(&mut self, version: Version, active: Vec<Job>, history: Vec<Job>) -> Applied {
        self.version = version;
        self.active_map = active.into_iter().map(|j| (j.id.clone(), j)).collect();
        self.history_map.clear();
        for job in history {
            // a job listed in both keeps its active entry
            if !self.active_map.contains_key(&job.id) {
                self.history_map.insert(job.id.clone(), job);
            }
        }
        self.rebuild();
        Applied::Changed
    }

    /// Upsert (or, for `DELETED`, remove) one job.
    ///
    /// An event with `version > 0` below the view's version is stale and
    /// discarded. Version 0 is treated as unversioned and always applied.
    pub fn apply_event(&mut self, kind: EventKind, version: Version, job: Job) -> Applied {
        if version > 0 && version < self.version {
            tracing::trace!(version, current = self.version, job_id = %job.id, "dropping stale event");
            return Applied::Stale;
        }

        self.active_map.remove(&job.id);
        self.history_map.remove(&job.id);
        if kind != EventKind::Deleted {
            if job.is_active() {
                self.active_map.insert(job.id.clone(), job);
            } else {
                self.history_map.insert(job.id.clone(), job);
            }
        }

        self.version = self.version.max(version);
        self.rebuild();
        Applied::Changed
    }

    /// Route a decoded wire message.
    pub fn apply_message(&mut self, message: WatchMessage) -> Applied {
        match message {
            WatchMessage::Snapshot { data, .. } => {
                self.apply_snapshot(data.version, data.active, data.history)
            }
            WatchMessage::Event {
                data: WatchEvent { kind, version, job },
            } => self.apply_event(kind, version, job),
            WatchMessage::Bookmark { .. } => Applied::Ignored,
        }
    }

    fn rebuild(&mut self) {
        let mut active: Vec<Job> = self.active_map.values().cloned().collect();
        sort_newest_first(&mut active);

        let mut history: Vec<Job> = self.history_map.values().cloned().collect();
        sort_newest_first(&mut history);
        if let Some(cap) = self.history_cap {
            if history.len() > cap {
                for evicted in history.drain(cap..) {
                    self.history_map.remove(&evicted.id);
                }
            }
        }

        self.active = active;
        self.history = history;
    }
}

/// Views are equal when they agree on version and the visible lists.
impl PartialEq for JobsView {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.active == other.active && self.history == other.history
    }
}
