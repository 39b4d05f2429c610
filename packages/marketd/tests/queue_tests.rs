//! Queue-store property tests over the in-memory implementation.

use std::sync::Arc;

use marketd_core::kernel::scheduler::{Job, JobQueue, JobStatus, JobType, MemoryJobQueue};
use tokio_test::assert_ok;

fn job(job_type: JobType, ticker: &str, priority: i32) -> Job {
    Job::new(job_type, ticker, priority, 3)
}

#[tokio::test]
async fn racing_dequeuers_get_exactly_one_winner() {
    let queue = Arc::new(MemoryJobQueue::new());
    assert_ok!(queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move { queue.dequeue().await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn dequeue_returns_priorities_in_order() {
    let queue = MemoryJobQueue::new();
    queue.enqueue(job(JobType::Timeline, "A.AU", 2)).await.unwrap();
    queue.enqueue(job(JobType::Eod, "B.AU", 10)).await.unwrap();
    queue.enqueue(job(JobType::News, "C.AU", 7)).await.unwrap();

    let order: Vec<i32> = [
        queue.dequeue().await.unwrap().unwrap(),
        queue.dequeue().await.unwrap().unwrap(),
        queue.dequeue().await.unwrap().unwrap(),
    ]
    .iter()
    .map(|j| j.priority)
    .collect();

    assert_eq!(order, vec![10, 7, 2]);
}

#[tokio::test]
async fn push_to_top_outranks_the_current_maximum() {
    let queue = MemoryJobQueue::new();
    queue.enqueue(job(JobType::Eod, "A.AU", 10)).await.unwrap();
    let b = queue.enqueue(job(JobType::News, "B.AU", 2)).await.unwrap();

    let max = queue.max_priority().await.unwrap();
    assert_eq!(max, 10);
    queue.set_priority(b.id, max + 1).await.unwrap();

    let next = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(next.id, b.id);
    assert_eq!(next.priority, 11);
}

#[tokio::test]
async fn max_priority_is_zero_on_an_idle_queue() {
    let queue = MemoryJobQueue::new();
    assert_eq!(queue.max_priority().await.unwrap(), 0);

    // terminal and running jobs do not count
    let done = queue.enqueue(job(JobType::Eod, "A.AU", 9)).await.unwrap();
    queue.dequeue().await.unwrap().unwrap();
    queue.complete(done.id, None, 1).await.unwrap();
    assert_eq!(queue.max_priority().await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_by_ticker_scopes_to_pending_jobs_of_that_ticker() {
    let queue = MemoryJobQueue::new();
    queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();
    queue.enqueue(job(JobType::News, "BHP.AU", 7)).await.unwrap();
    queue.enqueue(job(JobType::News, "CBA.AU", 7)).await.unwrap();

    // the highest-priority BHP job goes running first
    let running = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(running.ticker, "BHP.AU");

    let cancelled = queue.cancel_by_ticker("BHP.AU").await.unwrap();
    assert_eq!(cancelled, 1);

    let all = queue.list_all(0).await.unwrap();
    let by_status = |ticker: &str, status: JobStatus| {
        all.iter()
            .filter(|j| j.ticker == ticker && j.status == status)
            .count()
    };
    assert_eq!(by_status("BHP.AU", JobStatus::Running), 1);
    assert_eq!(by_status("BHP.AU", JobStatus::Cancelled), 1);
    assert_eq!(by_status("CBA.AU", JobStatus::Pending), 1);

    // cancellation is terminal and stamps completed_at
    let cancelled_job = all
        .iter()
        .find(|j| j.status == JobStatus::Cancelled)
        .unwrap();
    assert!(cancelled_job.completed_at.is_some());
}

#[tokio::test]
async fn pending_dedup_holds_one_job_per_type_and_ticker() {
    let queue = MemoryJobQueue::new();

    // the enqueue path's dedup probe
    assert!(!queue.has_pending("collect_eod", "BHP.AU").await.unwrap());
    queue.enqueue(job(JobType::Eod, "BHP.AU", 10)).await.unwrap();
    assert!(queue.has_pending("collect_eod", "BHP.AU").await.unwrap());

    let pending = queue.list_pending(0).await.unwrap();
    let duplicates = pending
        .iter()
        .filter(|j| j.job_type == "collect_eod" && j.ticker == "BHP.AU")
        .count();
    assert_eq!(duplicates, 1);
}

#[tokio::test]
async fn list_pending_respects_limit_and_order() {
    let queue = MemoryJobQueue::new();
    for (ticker, priority) in [("A.AU", 1), ("B.AU", 9), ("C.AU", 5)] {
        queue.enqueue(job(JobType::News, ticker, priority)).await.unwrap();
    }

    let top_two = queue.list_pending(2).await.unwrap();
    assert_eq!(top_two.len(), 2);
    assert_eq!(top_two[0].priority, 9);
    assert_eq!(top_two[1].priority, 5);

    assert_eq!(queue.list_pending(0).await.unwrap().len(), 3);
    assert_eq!(queue.count_pending().await.unwrap(), 3);
}
