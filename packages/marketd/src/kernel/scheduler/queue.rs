//! Job queue contract.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::Job;

/// Durable, priority-ordered work queue.
///
/// Every operation is atomic from the scheduler's point of view, and
/// `dequeue` must stay safe under concurrent callers: at most one observes
/// a given job. Deduplication is the caller's responsibility via
/// `has_pending` — `enqueue` itself never checks.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert, or overwrite the row with the same id (the retry re-enqueue
    /// path). A nil id is replaced with a fresh one.
    async fn enqueue(&self, job: Job) -> Result<Job>;

    /// Claim the highest-priority pending job, ties broken FIFO by
    /// `created_at`: flips it to running, stamps `started_at`, increments
    /// `attempts`, and returns it. `None` when the queue is idle.
    async fn dequeue(&self) -> Result<Option<Job>>;

    /// Terminate a running job: failed when `error` is present, completed
    /// otherwise. Stamps `completed_at` and records the wall time.
    async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> Result<()>;

    /// Cancel a pending job; running jobs are left alone. Returns whether
    /// anything changed.
    async fn cancel(&self, id: Uuid) -> Result<bool>;

    /// Cancel every pending job for a ticker; returns how many.
    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64>;

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<()>;

    /// Highest priority among pending jobs, 0 when none are pending.
    /// `max_priority` + `set_priority` together implement push-to-top.
    async fn max_priority(&self) -> Result<i32>;

    /// Pending jobs in dequeue order. A non-positive limit means all.
    async fn list_pending(&self, limit: i64) -> Result<Vec<Job>>;

    /// Every job, newest first. A non-positive limit means all.
    async fn list_all(&self, limit: i64) -> Result<Vec<Job>>;

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>>;

    async fn count_pending(&self) -> Result<i64>;

    /// Exact-match dedup probe. Pending only by design: a running
    /// collection does not block a refresh queued behind it.
    async fn has_pending(&self, job_type: &str, ticker: &str) -> Result<bool>;

    /// Drop terminal jobs whose `completed_at` precedes the cutoff.
    async fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Crash recovery: every running job back to pending with `started_at`
    /// cleared. Startup only — never while processors are live.
    async fn reset_running(&self) -> Result<u64>;
}
