//! Processor workers: drain the queue and dispatch jobs to collectors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::kernel::stocks::StockIndex;
use crate::kernel::traits::{BaseCollector, BaseSignalService};

use super::events::{JobEvent, JobEventKind};
use super::hub::EventHub;
use super::job::{Job, JobStatus, JobType};
use super::queue::JobQueue;

/// Sleep applied when the queue is empty or a dequeue fails.
const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// Why a dispatch did not succeed, and whether retrying can help.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    #[error("job dispatch panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Collector(#[from] anyhow::Error),
}

impl DispatchError {
    /// Collector failures may be transient; programming errors and panics
    /// never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Collector(_))
    }
}

pub struct Processor {
    queue: Arc<dyn JobQueue>,
    stocks: Arc<dyn StockIndex>,
    collector: Arc<dyn BaseCollector>,
    signals: Arc<dyn BaseSignalService>,
    hub: EventHub,
}

impl Processor {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        stocks: Arc<dyn StockIndex>,
        collector: Arc<dyn BaseCollector>,
        signals: Arc<dyn BaseSignalService>,
        hub: EventHub,
    ) -> Self {
        Self {
            queue,
            stocks,
            collector,
            signals,
            hub,
        }
    }

    /// Worker loop. The manager spawns `max_concurrent` of these over one
    /// shared `Processor`.
    pub async fn run(self: Arc<Self>, worker_id: usize, shutdown: CancellationToken) {
        debug!(worker_id, "processor started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let job = match self.queue.dequeue().await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    }
                    continue;
                }
                Err(e) => {
                    error!(worker_id, error = %e, "failed to dequeue job");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    }
                    continue;
                }
            };

            self.process(worker_id, job).await;
        }

        debug!(worker_id, "processor stopped");
    }

    /// Run one dequeued job to a terminal state or a retry re-enqueue.
    /// The job value is owned here until then; nothing else mutates it.
    async fn process(&self, worker_id: usize, mut job: Job) {
        debug!(
            worker_id,
            job_id = %job.id,
            job_type = %job.job_type,
            ticker = %job.ticker,
            attempt = job.attempts,
            "job started"
        );
        self.broadcast(JobEventKind::JobStarted, job.clone()).await;

        let started = Instant::now();
        let result = self.dispatch(&job).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(()) => {
                self.record_collected(&job).await;
                if let Err(e) = self.queue.complete(job.id, None, duration_ms).await {
                    error!(job_id = %job.id, error = %e, "failed to record completed job");
                }
                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    ticker = %job.ticker,
                    duration_ms,
                    "job completed"
                );

                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                job.duration_ms = duration_ms;
                self.broadcast(JobEventKind::JobCompleted, job).await;
            }
            Err(e) => {
                if e.is_retryable() && job.has_attempts_left() {
                    warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempt = job.attempts,
                        max_attempts = job.max_attempts,
                        error = %e,
                        "job failed, re-enqueueing"
                    );
                    // same id: the attempt counter from the dequeue stays
                    let mut retry = job.clone();
                    retry.status = JobStatus::Pending;
                    retry.error.clear();
                    match self.queue.enqueue(retry).await {
                        Ok(_) => return,
                        Err(enqueue_err) => {
                            error!(
                                job_id = %job.id,
                                error = %enqueue_err,
                                "re-enqueue failed, recording terminal failure"
                            );
                        }
                    }
                }

                let message = e.to_string();
                if let Err(mark_err) = self
                    .queue
                    .complete(job.id, Some(message.as_str()), duration_ms)
                    .await
                {
                    error!(job_id = %job.id, error = %mark_err, "failed to record failed job");
                }
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    ticker = %job.ticker,
                    error = %message,
                    "job failed"
                );

                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error = message;
                job.duration_ms = duration_ms;
                self.broadcast(JobEventKind::JobFailed, job).await;
            }
        }
    }

    /// Dispatch on job type inside its own task, so a panicking collector
    /// takes down the job and not the worker.
    async fn dispatch(&self, job: &Job) -> Result<(), DispatchError> {
        let Some(job_type) = job.kind() else {
            return Err(DispatchError::UnknownJobType(job.job_type.clone()));
        };

        let collector = Arc::clone(&self.collector);
        let signals = Arc::clone(&self.signals);
        let target = job.ticker.clone();
        let handle = tokio::spawn(async move {
            match job_type {
                JobType::Eod => collector.collect_eod(&target, false).await,
                JobType::EodBulk => collector.collect_eod_bulk(&target).await,
                JobType::Fundamentals => collector.collect_fundamentals(&target, false).await,
                JobType::Filings => collector.collect_filings(&target, false).await,
                JobType::FilingPdfs => collector.collect_filing_pdfs(&target, false).await,
                JobType::News => collector.collect_news(&target, false).await,
                JobType::FilingSummaries => {
                    collector.collect_filing_summaries(&target, false).await
                }
                JobType::Timeline => collector.collect_timeline(&target, false).await,
                JobType::NewsIntel => collector.collect_news_intel(&target, false).await,
                JobType::Signals => signals.compute_signals(&target).await,
            }
        });

        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DispatchError::Collector(e)),
            Err(join_err) if join_err.is_panic() => {
                Err(DispatchError::Panicked(panic_message(join_err)))
            }
            Err(_) => Err(DispatchError::Collector(anyhow::anyhow!(
                "job task aborted before completion"
            ))),
        }
    }

    /// Stamp the index column for a successful per-ticker job. Bulk EOD
    /// has no single column; its collector stamps each ticker itself.
    async fn record_collected(&self, job: &Job) {
        let Some(field) = job.kind().and_then(|t| t.timestamp_field()) else {
            return;
        };
        if let Err(e) = self
            .stocks
            .update_timestamp(&job.ticker, field.as_str(), Utc::now())
            .await
        {
            warn!(
                ticker = %job.ticker,
                field = field.as_str(),
                error = %e,
                "failed to stamp collection time"
            );
        }
    }

    async fn broadcast(&self, kind: JobEventKind, job: Job) {
        let queue_size = self.queue.count_pending().await.unwrap_or(0);
        self.hub.broadcast(JobEvent::new(kind, job, queue_size));
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "panic with non-string payload".to_string()
            }
        }
        Err(_) => "job task aborted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_errors_retry_programming_errors_do_not() {
        assert!(DispatchError::Collector(anyhow::anyhow!("timeout")).is_retryable());
        assert!(!DispatchError::UnknownJobType("mystery".into()).is_retryable());
        assert!(!DispatchError::Panicked("boom".into()).is_retryable());
    }

    #[tokio::test]
    async fn panic_message_extracts_str_payload() {
        let handle = tokio::spawn(async { panic!("collector exploded") });
        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(panic_message(err), "collector exploded");
    }

    #[tokio::test]
    async fn panic_message_extracts_string_payload() {
        let detail = String::from("formatted failure 42");
        let handle = tokio::spawn(async move { panic!("{}", detail) });
        let err = handle.await.unwrap_err();
        assert_eq!(panic_message(err), "formatted failure 42");
    }
}
