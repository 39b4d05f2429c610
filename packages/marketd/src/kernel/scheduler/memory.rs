//! In-memory job queue for tests and embedded use.
//!
//! A single mutex guards the whole map, so every operation — dequeue
//! included — is atomic under concurrent callers.

use std::cmp::Reverse;
use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::job::{Job, JobStatus};
use super::queue::JobQueue;

#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, mut job: Job) -> Result<Job> {
        if job.id.is_nil() {
            job.id = Uuid::new_v4();
        }
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().await;

        // max priority first, FIFO inside a priority level
        let next = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| (j.priority, Reverse(j.created_at), j.id))
            .max()
            .map(|(_, _, id)| id);

        let Some(job) = next.and_then(|id| jobs.get_mut(&id)) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.attempts += 1;

        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(());
        };
        if job.status != JobStatus::Running {
            return Ok(());
        }

        match error {
            Some(message) if !message.is_empty() => {
                job.status = JobStatus::Failed;
                job.error = message.to_string();
            }
            _ => {
                job.status = JobStatus::Completed;
                job.error.clear();
            }
        }
        job.completed_at = Some(Utc::now());
        job.duration_ms = duration_ms;

        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let mut cancelled = 0;
        for job in jobs.values_mut() {
            if job.ticker == ticker && job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<()> {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.priority = priority;
        }
        Ok(())
    }

    async fn max_priority(&self) -> Result<i32> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.priority)
            .max()
            .unwrap_or(0))
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut pending: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        if limit > 0 {
            pending.truncate(limit as usize);
        }
        Ok(pending)
    }

    async fn list_all(&self, limit: i64) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if limit > 0 {
            all.truncate(limit as usize);
        }
        Ok(all)
    }

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| j.ticker == ticker)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn count_pending(&self) -> Result<i64> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }

    async fn has_pending(&self, job_type: &str, ticker: &str) -> Result<bool> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.values().any(|j| {
            j.status == JobStatus::Pending && j.job_type == job_type && j.ticker == ticker
        }))
    }

    async fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal()
                && job.completed_at.map(|ts| ts < older_than).unwrap_or(false))
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn reset_running(&self) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let mut reset = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.started_at = None;
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::scheduler::job::JobType;

    fn job(job_type: JobType, ticker: &str, priority: i32) -> Job {
        Job::new(job_type, ticker, priority, 3)
    }

    #[tokio::test]
    async fn dequeue_orders_by_priority_then_fifo() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(job(JobType::Timeline, "A.AU", 2)).await.unwrap();
        queue.enqueue(job(JobType::Eod, "B.AU", 10)).await.unwrap();
        queue.enqueue(job(JobType::News, "C.AU", 7)).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        let second = queue.dequeue().await.unwrap().unwrap();
        let third = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(
            (first.priority, second.priority, third.priority),
            (10, 7, 2)
        );
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dequeue_breaks_priority_ties_by_age() {
        let queue = MemoryJobQueue::new();
        let mut older = job(JobType::News, "OLD.AU", 5);
        older.created_at = Utc::now() - chrono::Duration::seconds(30);
        let newer = job(JobType::News, "NEW.AU", 5);

        queue.enqueue(newer).await.unwrap();
        queue.enqueue(older).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.ticker, "OLD.AU");
    }

    #[tokio::test]
    async fn dequeue_marks_running_and_counts_attempt() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();

        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.started_at.is_some());
        assert_eq!(queue.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn complete_with_error_fails_the_job() {
        let queue = MemoryJobQueue::new();
        let queued = queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        queue
            .complete(queued.id, Some("upstream timeout"), 1200)
            .await
            .unwrap();

        let all = queue.list_all(0).await.unwrap();
        assert_eq!(all[0].status, JobStatus::Failed);
        assert_eq!(all[0].error, "upstream timeout");
        assert_eq!(all[0].duration_ms, 1200);
        assert!(all[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn complete_ignores_non_running_jobs() {
        let queue = MemoryJobQueue::new();
        let queued = queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();

        queue.complete(queued.id, None, 10).await.unwrap();
        assert_eq!(queue.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_leaves_running_jobs_alone() {
        let queue = MemoryJobQueue::new();
        let queued = queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        assert!(!queue.cancel(queued.id).await.unwrap());
    }

    #[tokio::test]
    async fn has_pending_is_exact_match() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(job(JobType::News, "BHP.AU", 7)).await.unwrap();

        assert!(queue.has_pending("collect_news", "BHP.AU").await.unwrap());
        assert!(!queue.has_pending("collect_news", "CBA.AU").await.unwrap());
        assert!(!queue.has_pending("collect_eod", "BHP.AU").await.unwrap());

        // running no longer counts
        queue.dequeue().await.unwrap().unwrap();
        assert!(!queue.has_pending("collect_news", "BHP.AU").await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_only_old_terminal_jobs() {
        let queue = MemoryJobQueue::new();
        let done = queue.enqueue(job(JobType::Eod, "OLD.AU", 10)).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.complete(done.id, None, 5).await.unwrap();
        queue.enqueue(job(JobType::Eod, "KEEP.AU", 10)).await.unwrap();

        // cutoff in the past keeps everything
        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(queue.purge_completed(past).await.unwrap(), 0);

        // cutoff in the future drops the terminal job only
        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(queue.purge_completed(future).await.unwrap(), 1);
        assert_eq!(queue.list_all(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reset_running_restores_pending() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(job(JobType::Eod, "A.AU", 10)).await.unwrap();
        queue.enqueue(job(JobType::Eod, "B.AU", 10)).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.dequeue().await.unwrap().unwrap();

        assert_eq!(queue.reset_running().await.unwrap(), 2);
        let pending = queue.list_pending(0).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|j| j.started_at.is_none()));
        // attempt counters survive recovery
        assert!(pending.iter().all(|j| j.attempts == 1));
    }

    #[tokio::test]
    async fn enqueue_overwrites_by_id() {
        let queue = MemoryJobQueue::new();
        let queued = queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();
        let mut claimed = queue.dequeue().await.unwrap().unwrap();

        // the retry path: same id back to pending, error cleared
        claimed.status = JobStatus::Pending;
        claimed.error.clear();
        queue.enqueue(claimed).await.unwrap();

        let all = queue.list_all(0).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, queued.id);
        assert_eq!(all[0].status, JobStatus::Pending);
        assert_eq!(all[0].attempts, 1);
    }

    #[tokio::test]
    async fn enqueue_generates_missing_id() {
        let queue = MemoryJobQueue::new();
        let mut nil_id = job(JobType::Eod, "BHP.AU", 10);
        nil_id.id = Uuid::nil();

        let stored = queue.enqueue(nil_id).await.unwrap();
        assert!(!stored.id.is_nil());
    }
}
