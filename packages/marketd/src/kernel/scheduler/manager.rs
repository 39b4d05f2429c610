//! Scheduler lifecycle and public API surface.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::common::freshness::FreshnessPolicy;
use crate::config::SchedulerConfig;
use crate::kernel::stocks::StockIndex;
use crate::kernel::traits::{BaseCollector, BaseSignalService};

use super::hub::EventHub;
use super::job::{Job, JobType};
use super::queue::JobQueue;
use super::watcher::{enqueue_if_needed, Watcher};
use super::worker::Processor;

/// Demand-driven fast set: cheap refreshes a user is waiting on.
const FAST_JOBS: [JobType; 4] = [
    JobType::Eod,
    JobType::Fundamentals,
    JobType::News,
    JobType::Signals,
];

/// Demand-driven slow set: filings-derived and AI-generated data.
const SLOW_JOBS: [JobType; 5] = [
    JobType::Filings,
    JobType::FilingPdfs,
    JobType::FilingSummaries,
    JobType::Timeline,
    JobType::NewsIntel,
];

struct Running {
    shutdown: CancellationToken,
    hub: EventHub,
    handles: Vec<JoinHandle<()>>,
}

/// Owns the watcher, the worker pool and the event hub, and exposes the
/// admin/demand API around the queue.
pub struct SchedulerManager {
    config: SchedulerConfig,
    stocks: Arc<dyn StockIndex>,
    queue: Arc<dyn JobQueue>,
    collector: Arc<dyn BaseCollector>,
    signals: Arc<dyn BaseSignalService>,
    freshness: FreshnessPolicy,
    hub: std::sync::RwLock<EventHub>,
    running: Mutex<Option<Running>>,
}

impl SchedulerManager {
    pub fn new(
        config: SchedulerConfig,
        stocks: Arc<dyn StockIndex>,
        queue: Arc<dyn JobQueue>,
        collector: Arc<dyn BaseCollector>,
        signals: Arc<dyn BaseSignalService>,
        freshness: FreshnessPolicy,
    ) -> Self {
        Self {
            config,
            stocks,
            queue,
            collector,
            signals,
            freshness,
            hub: std::sync::RwLock::new(EventHub::new()),
            running: Mutex::new(None),
        }
    }

    /// Current event hub handle, for WebSocket upgrade handlers. Each
    /// `start` installs a fresh hub; subscribers of an older one see their
    /// stream end and reconnect.
    pub fn hub(&self) -> EventHub {
        self.hub.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Start the hub dispatcher, the watcher and the worker pool. A second
    /// call stops the running instance first and starts afresh. No-op when
    /// disabled by config.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("scheduler disabled by config, not starting");
            return Ok(());
        }

        self.stop().await;

        // Recover jobs stranded in running by an abrupt shutdown. Must
        // happen before any worker is spawned.
        let recovered = self.queue.reset_running().await?;
        if recovered > 0 {
            warn!(recovered, "reset running jobs left over from previous run");
        }

        let hub = EventHub::new();
        *self.hub.write().unwrap_or_else(|e| e.into_inner()) = hub.clone();

        let shutdown = CancellationToken::new();
        let mut handles = Vec::new();

        handles.push(tokio::spawn(hub.clone().run()));

        let watcher = Watcher::new(
            Arc::clone(&self.stocks),
            Arc::clone(&self.queue),
            hub.clone(),
            self.freshness.clone(),
            self.config.clone(),
        );
        handles.push(tokio::spawn(watcher.run(shutdown.clone())));

        let worker_count = self.config.worker_count();
        let processor = Arc::new(Processor::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.stocks),
            Arc::clone(&self.collector),
            Arc::clone(&self.signals),
            hub.clone(),
        ));
        for worker_id in 0..worker_count {
            handles.push(tokio::spawn(
                Arc::clone(&processor).run(worker_id, shutdown.clone()),
            ));
        }

        info!(
            workers = worker_count,
            interval_secs = self.config.watcher_interval.as_secs(),
            "scheduler started"
        );

        *self.running.lock().await = Some(Running {
            shutdown,
            hub,
            handles,
        });
        Ok(())
    }

    /// Stop everything and wait for the tasks to exit. Safe without a
    /// prior start and across repeated calls.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.shutdown.cancel();
        running.hub.stop();
        for handle in running.handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "scheduler task panicked");
                }
            }
        }

        info!("scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Enqueue unless an identical job is already pending.
    pub async fn enqueue_if_needed(
        &self,
        job_type: JobType,
        target: &str,
        priority: i32,
    ) -> Result<bool> {
        enqueue_if_needed(
            &self.queue,
            &self.hub(),
            job_type,
            target,
            priority,
            self.config.max_retries,
        )
        .await
    }

    /// Demand-driven refresh of the fast components for a set of tickers,
    /// bypassing freshness (dedup still applies). Returns how many jobs
    /// were actually enqueued.
    pub async fn enqueue_ticker_jobs(&self, tickers: &[String]) -> usize {
        let mut queued = 0;
        for ticker in tickers {
            for job_type in FAST_JOBS {
                match self
                    .enqueue_if_needed(job_type, ticker, job_type.default_priority())
                    .await
                {
                    Ok(true) => queued += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        ticker = %ticker,
                        job_type = %job_type,
                        error = %e,
                        "demand enqueue failed"
                    ),
                }
            }
        }
        queued
    }

    /// Demand-driven refresh of the slow, derived components for one
    /// ticker, bypassing freshness.
    pub async fn enqueue_slow_data_jobs(&self, ticker: &str) -> usize {
        let mut queued = 0;
        for job_type in SLOW_JOBS {
            match self
                .enqueue_if_needed(job_type, ticker, job_type.default_priority())
                .await
            {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    ticker = %ticker,
                    job_type = %job_type,
                    error = %e,
                    "demand enqueue failed"
                ),
            }
        }
        queued
    }

    /// Promote a pending job above everything currently queued. Concurrent
    /// enqueues may outrank it again; re-issue if it matters.
    pub async fn push_to_top(&self, id: Uuid) -> Result<()> {
        let max = self.queue.max_priority().await?;
        self.queue.set_priority(id, max + 1).await?;
        info!(job_id = %id, priority = max + 1, "job pushed to top");
        Ok(())
    }

    // Admin reads and cancellation, delegated to the queue store.

    pub async fn jobs_pending(&self, limit: i64) -> Result<Vec<Job>> {
        self.queue.list_pending(limit).await
    }

    pub async fn jobs_all(&self, limit: i64) -> Result<Vec<Job>> {
        self.queue.list_all(limit).await
    }

    pub async fn jobs_for_ticker(&self, ticker: &str) -> Result<Vec<Job>> {
        self.queue.list_by_ticker(ticker).await
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.queue.count_pending().await
    }

    pub async fn cancel_job(&self, id: Uuid) -> Result<bool> {
        let cancelled = self.queue.cancel(id).await?;
        if cancelled {
            info!(job_id = %id, "job cancelled");
        }
        Ok(cancelled)
    }

    pub async fn cancel_ticker_jobs(&self, ticker: &str) -> Result<u64> {
        let cancelled = self.queue.cancel_by_ticker(ticker).await?;
        if cancelled > 0 {
            info!(ticker, cancelled, "cancelled pending jobs for ticker");
        }
        Ok(cancelled)
    }
}
