//! Authoritative in-memory job registry and version counter.
//!
//! All mutations run under one write guard: the state change, the version
//! increment and the broker publication happen together, so readers never see
//! a state whose version does not match, and events reach the broker in
//! version order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use metrics::{counter, gauge};

use crate::broker::{Subscription, WatchBroker};
use crate::error::LedgerError;
use crate::job::{sort_newest_first, Job, JobId, JobStatus, Progress, Version};
use crate::protocol::{EventKind, Snapshot, WatchEvent};

/// Default number of jobs included in a snapshot's history.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Largest snapshot history a watcher may ask for.
pub const MAX_HISTORY_LIMIT: usize = 1000;

struct LedgerInner {
    version: Version,
    jobs: HashMap<JobId, Job>,
    /// Finished job ids in termination order, oldest first.
    finished: VecDeque<JobId>,
}

impl LedgerInner {
    fn sorted(&self, active: bool) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| j.is_active() == active)
            .cloned()
            .collect();
        sort_newest_first(&mut jobs);
        jobs
    }

    fn snapshot(&self, history_limit: usize) -> Snapshot {
        let mut history = self.sorted(false);
        history.truncate(history_limit);
        Snapshot {
            version: self.version,
            active: self.sorted(true),
            history,
        }
    }
}

/// Central job ledger.
///
/// Owns every [`Job`]; callers only ever receive copies.
pub struct JobLedger {
    inner: RwLock<LedgerInner>,
    broker: Arc<WatchBroker>,
    history_retention: Option<usize>,
}

impl JobLedger {
    /// Create an empty ledger at version 0 publishing into `broker`.
    pub fn new(broker: Arc<WatchBroker>) -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                version: 0,
                jobs: HashMap::new(),
                finished: VecDeque::new(),
            }),
            broker,
            history_retention: None,
        }
    }

    /// Keep at most `retention` finished jobs; older ones are evicted with a
    /// `DELETED` event.
    pub fn with_history_retention(mut self, retention: usize) -> Self {
        self.history_retention = Some(retention);
        self
    }

    pub fn broker(&self) -> &Arc<WatchBroker> {
        &self.broker
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerInner> {
        self.inner.read().unwrap_or_else(|e| {
            tracing::error!("ledger lock poisoned on read, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerInner> {
        self.inner.write().unwrap_or_else(|e| {
            tracing::error!("ledger lock poisoned on write, recovering");
            e.into_inner()
        })
    }

    /// Bump the version and publish. Caller holds the write guard.
    fn commit(&self, inner: &mut LedgerInner, kind: EventKind, job: Job) -> Version {
        inner.version += 1;
        let version = inner.version;
        tracing::debug!(
            job_id = %job.id,
            status = %job.status,
            kind = kind.as_str(),
            version,
            "ledger mutation"
        );
        self.broker.publish(WatchEvent { kind, version, job });
        gauge!("jobwatch_ledger_version").set(version as f64);
        counter!("jobwatch_ledger_mutations_total", "kind" => kind.as_str()).increment(1);
        version
    }

    fn enforce_retention(&self, inner: &mut LedgerInner) {
        let Some(retention) = self.history_retention else {
            return;
        };
        while inner.finished.len() > retention {
            let Some(id) = inner.finished.pop_front() else {
                break;
            };
            if let Some(job) = inner.jobs.remove(&id) {
                tracing::debug!(job_id = %id, "evicting finished job past retention");
                self.commit(inner, EventKind::Deleted, job);
            }
        }
    }

    /// Register a new job. Emits `ADDED`.
    pub fn create(&self, mut job: Job) -> Result<Version, LedgerError> {
        let mut inner = self.write();
        if inner.jobs.contains_key(&job.id) {
            return Err(LedgerError::AlreadyExists(job.id));
        }

        let now = Utc::now();
        if job.status == JobStatus::Running && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        let finished = job.status.is_terminal();
        if finished {
            job.ended_at.get_or_insert(now);
            inner.finished.push_back(job.id.clone());
        }

        inner.jobs.insert(job.id.clone(), job.clone());
        let version = self.commit(&mut inner, EventKind::Added, job);
        if finished {
            self.enforce_retention(&mut inner);
        }
        Ok(version)
    }

    /// Move a queued job to running. Emits `MODIFIED`; a job that is already
    /// running is left untouched.
    pub fn start(&self, id: &str) -> Result<Version, LedgerError> {
        let mut inner = self.write();
        let current = inner.version;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        match job.status {
            JobStatus::Running => return Ok(current),
            status if status.is_terminal() => {
                return Err(LedgerError::already_finished(id, status));
            }
            _ => {}
        }
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        let job = job.clone();
        Ok(self.commit(&mut inner, EventKind::Modified, job))
    }

    /// Replace a live job's progress. Emits `MODIFIED`.
    pub fn update_progress(&self, id: &str, progress: Progress) -> Result<Version, LedgerError> {
        let mut inner = self.write();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(LedgerError::already_finished(id, job.status));
        }
        job.progress = progress;
        let job = job.clone();
        Ok(self.commit(&mut inner, EventKind::Modified, job))
    }

    /// Finish a live job with a terminal status. Emits `MODIFIED`, then a
    /// `DELETED` for each finished job pushed past retention.
    pub fn terminate(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Version, LedgerError> {
        if !status.is_terminal() {
            return Err(LedgerError::NotTerminal(status));
        }
        let mut inner = self.write();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(LedgerError::already_finished(id, job.status));
        }
        job.status = status;
        job.ended_at = Some(Utc::now());
        job.error = error;
        let job = job.clone();
        inner.finished.push_back(job.id.clone());
        let version = self.commit(&mut inner, EventKind::Modified, job);
        self.enforce_retention(&mut inner);
        Ok(version)
    }

    /// Consistent point-in-time view; history holds at most `history_limit`
    /// jobs.
    pub fn snapshot(&self, history_limit: usize) -> Snapshot {
        self.read().snapshot(history_limit)
    }

    /// Subscribe after `since` and snapshot under the same read guard, so no
    /// mutation can land between the two.
    pub fn watch(&self, since: Version, history_limit: usize) -> (Snapshot, Subscription) {
        let inner = self.read();
        let subscription = self.broker.subscribe(since);
        (inner.snapshot(history_limit), subscription)
    }

    pub fn current_version(&self) -> Version {
        self.read().version
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.read().jobs.get(id).cloned()
    }

    /// Queued and running jobs, newest first.
    pub fn list_active(&self) -> Vec<Job> {
        self.read().sorted(true)
    }

    /// Finished jobs, newest first.
    pub fn list_history(&self, limit: Option<usize>) -> Vec<Job> {
        let mut history = self.read().sorted(false);
        if let Some(limit) = limit {
            history.truncate(limit);
        }
        history
    }
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new(Arc::new(WatchBroker::default()))
    }
}
