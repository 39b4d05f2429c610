//! Staleness watcher: turns stale freshness timestamps into queued work.
//!
//! Runs one scan per configured interval. Individual EOD staleness is not
//! enqueued per ticker; it is batched into one bulk job per exchange.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::freshness::FreshnessPolicy;
use crate::common::ticker::exchange_of;
use crate::config::SchedulerConfig;
use crate::kernel::stocks::{StockEntry, StockIndex};

use super::events::{JobEvent, JobEventKind};
use super::hub::EventHub;
use super::job::{Job, JobType, NEW_STOCK_PRIORITY};
use super::queue::JobQueue;

/// How recently an entry must have been added to count as new.
const NEW_STOCK_WINDOW_SECS: i64 = 5 * 60;
/// Backoff bounds for failed scans.
const BACKOFF_INITIAL: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

pub struct Watcher {
    stocks: Arc<dyn StockIndex>,
    queue: Arc<dyn JobQueue>,
    hub: EventHub,
    freshness: FreshnessPolicy,
    config: SchedulerConfig,
}

impl Watcher {
    pub fn new(
        stocks: Arc<dyn StockIndex>,
        queue: Arc<dyn JobQueue>,
        hub: EventHub,
        freshness: FreshnessPolicy,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            stocks,
            queue,
            hub,
            freshness,
            config,
        }
    }

    /// Watcher loop. Scans once per interval until the token fires; a
    /// failed scan sleeps the backoff before the next tick is scheduled.
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.watcher_startup_delay.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.config.watcher_startup_delay) => {}
            }
        }

        info!(
            interval_secs = self.config.watcher_interval.as_secs(),
            "watcher started"
        );

        let mut backoff = Duration::ZERO;
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.scan().await {
                Ok(queued) => {
                    backoff = Duration::ZERO;
                    if queued > 0 {
                        info!(queued, "watcher scan enqueued work");
                    }
                    self.purge().await;
                }
                Err(e) => {
                    backoff = next_backoff(backoff);
                    error!(
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "watcher scan failed"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.watcher_interval) => {}
            }
        }

        info!("watcher stopped");
    }

    /// One pass over the stock index. Returns how many jobs were enqueued.
    ///
    /// Public so demand paths and tests can trigger a scan without waiting
    /// out the interval.
    pub async fn scan(&self) -> Result<usize> {
        let entries = self.stocks.list().await?;
        let now = Utc::now();

        let mut queued = 0;
        let mut stale_eod_exchanges: BTreeSet<String> = BTreeSet::new();

        for entry in &entries {
            let is_new = is_new_stock(entry, now);

            // EOD is collected in bulk by exchange; record the exchange
            // rather than enqueueing per ticker.
            if !self
                .freshness
                .is_fresh(entry.eod_collected_at, JobType::Eod.threshold(&self.freshness))
            {
                let exchange = exchange_of(&entry.ticker);
                if exchange.is_empty() {
                    debug!(
                        ticker = %entry.ticker,
                        "ticker has no exchange suffix, cannot batch EOD"
                    );
                } else {
                    stale_eod_exchanges.insert(exchange.to_string());
                }
            }

            for job_type in JobType::WATCHED {
                // signals are derived from EOD bars
                if job_type == JobType::Signals && entry.eod_collected_at.is_none() {
                    continue;
                }
                let Some(field) = job_type.timestamp_field() else {
                    continue;
                };
                if self
                    .freshness
                    .is_fresh(entry.collected_at(field), job_type.threshold(&self.freshness))
                {
                    continue;
                }

                let priority = if is_new {
                    NEW_STOCK_PRIORITY
                } else {
                    job_type.default_priority()
                };
                match enqueue_if_needed(
                    &self.queue,
                    &self.hub,
                    job_type,
                    &entry.ticker,
                    priority,
                    self.config.max_retries,
                )
                .await
                {
                    Ok(true) => queued += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        ticker = %entry.ticker,
                        job_type = %job_type,
                        error = %e,
                        "failed to enqueue job"
                    ),
                }
            }
        }

        for exchange in stale_eod_exchanges {
            match enqueue_if_needed(
                &self.queue,
                &self.hub,
                JobType::EodBulk,
                &exchange,
                JobType::EodBulk.default_priority(),
                self.config.max_retries,
            )
            .await
            {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    exchange = %exchange,
                    error = %e,
                    "failed to enqueue bulk EOD job"
                ),
            }
        }

        Ok(queued)
    }

    async fn purge(&self) {
        let Ok(horizon) = chrono::Duration::from_std(self.config.purge_after) else {
            return;
        };
        match self.queue.purge_completed(Utc::now() - horizon).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged terminal jobs"),
            Err(e) => warn!(error = %e, "failed to purge terminal jobs"),
        }
    }
}

/// A ticker is new while its first observation is recent and EOD was never
/// collected; its per-ticker jobs jump the queue.
fn is_new_stock(entry: &StockEntry, now: DateTime<Utc>) -> bool {
    entry.eod_collected_at.is_none()
        && now.signed_duration_since(entry.added_at)
            <= chrono::Duration::seconds(NEW_STOCK_WINDOW_SECS)
}

fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        BACKOFF_INITIAL
    } else {
        (current * 2).min(BACKOFF_MAX)
    }
}

/// Dedup-checked enqueue shared by the watcher and the manager API.
///
/// Skips silently when an identical job is already pending; otherwise
/// enqueues and broadcasts `job_queued`. Returns whether a job was created.
pub(crate) async fn enqueue_if_needed(
    queue: &Arc<dyn JobQueue>,
    hub: &EventHub,
    job_type: JobType,
    target: &str,
    priority: i32,
    max_attempts: i32,
) -> Result<bool> {
    if queue.has_pending(job_type.as_str(), target).await? {
        return Ok(false);
    }

    let job = Job::new(job_type, target, priority, max_attempts);
    let job = queue.enqueue(job).await?;
    debug!(
        job_id = %job.id,
        job_type = %job_type,
        target,
        priority,
        "job enqueued"
    );

    let queue_size = queue.count_pending().await.unwrap_or(0);
    hub.broadcast(JobEvent::new(JobEventKind::JobQueued, job, queue_size));

    Ok(true)
}
