//! Job data model shared by the ledger, the wire protocol and the client view.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a job.
pub type JobId = String;

/// Position in the ledger's mutation stream.
pub type Version = u64;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// A job is active iff it is queued or running; everything else is history.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress counters reported by the job's producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: u64,
    pub done: u64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Progress {
    pub fn new(total: u64, unit: impl Into<String>) -> Self {
        Self {
            total,
            done: 0,
            unit: unit.into(),
            note: None,
        }
    }

    pub fn with_done(mut self, done: u64) -> Self {
        self.done = done;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A tracked background job.
///
/// Identity is `id`; every other field may change over the job's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    /// Build a queued job created now.
    pub fn new(id: impl Into<JobId>, job_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            status: JobStatus::Queued,
            title: title.into(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            progress: Progress::default(),
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Display order for job lists: newest `created_at` first, ties broken by id.
pub fn newest_first(a: &Job, b: &Job) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort a list of jobs into display order.
pub fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(newest_first);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_job_serialize_wire_names() {
        let job = Job::new("a", "file_transfer", "Copy photos")
            .with_progress(Progress::new(10, "files").with_done(5));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "file_transfer");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["progress"]["done"], 5);
        assert!(json.get("started_at").is_none());
        assert!(json.get("error").is_none());
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn test_job_deserialize_minimal() {
        let json = r#"{
            "id": "x",
            "type": "t",
            "status": "canceled",
            "title": "X",
            "created_at": "2026-02-05T12:00:00Z",
            "progress": {"total": 0, "done": 0, "unit": ""}
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert!(job.metadata.is_empty());
    }

    #[test]
    fn test_newest_first_tie_breaks_on_id() {
        let at = Utc.with_ymd_and_hms(2026, 2, 5, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 2, 5, 12, 0, 1).unwrap();
        let mut jobs = vec![
            Job::new("b", "t", "B").with_created_at(at),
            Job::new("a", "t", "A").with_created_at(at),
            Job::new("c", "t", "C").with_created_at(later),
        ];
        sort_newest_first(&mut jobs);
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
