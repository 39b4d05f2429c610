//! Job lifecycle events broadcast to hub subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Job;

/// Wire names are part of the interface and must not drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    JobQueued,
    JobStarted,
    JobCompleted,
    JobFailed,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventKind::JobQueued => "job_queued",
            JobEventKind::JobStarted => "job_started",
            JobEventKind::JobCompleted => "job_completed",
            JobEventKind::JobFailed => "job_failed",
        }
    }
}

/// A job state transition as observed by subscribers.
///
/// `job` is the full record at the moment of the transition and
/// `queue_size` the pending count just after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: JobEventKind,
    pub job: Job,
    pub timestamp: DateTime<Utc>,
    pub queue_size: i64,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: Job, queue_size: i64) -> Self {
        Self {
            kind,
            job,
            timestamp: Utc::now(),
            queue_size,
        }
    }

    /// Serialize for the wire. Events are plain data; failure collapses to
    /// null rather than panicking a stream handler.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
