//! Job model for collection work.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::freshness::FreshnessPolicy;
use crate::kernel::stocks::TimestampField;

/// Priority a newly observed ticker's per-ticker jobs are enqueued at,
/// above every type default.
pub const NEW_STOCK_PRIORITY: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states carry `completed_at` and are eligible for purge.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// The collection work a job dispatches to.
///
/// Persisted jobs carry the string form; the identifiers below appear in
/// stored records and wire events and must not drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    Eod,
    EodBulk,
    Fundamentals,
    Filings,
    FilingPdfs,
    News,
    FilingSummaries,
    Timeline,
    NewsIntel,
    Signals,
}

impl JobType {
    /// Every type keyed by a qualified ticker (everything but bulk EOD).
    pub const PER_TICKER: [JobType; 9] = [
        JobType::Eod,
        JobType::Fundamentals,
        JobType::Filings,
        JobType::FilingPdfs,
        JobType::News,
        JobType::FilingSummaries,
        JobType::Timeline,
        JobType::NewsIntel,
        JobType::Signals,
    ];

    /// The types the watcher checks per index entry. Single-ticker EOD is
    /// absent: the watcher batches stale EOD by exchange instead.
    pub const WATCHED: [JobType; 8] = [
        JobType::Fundamentals,
        JobType::Filings,
        JobType::FilingPdfs,
        JobType::News,
        JobType::FilingSummaries,
        JobType::Timeline,
        JobType::NewsIntel,
        JobType::Signals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Eod => "collect_eod",
            JobType::EodBulk => "collect_eod_bulk",
            JobType::Fundamentals => "collect_fundamentals",
            JobType::Filings => "collect_filings",
            JobType::FilingPdfs => "collect_filing_pdfs",
            JobType::News => "collect_news",
            JobType::FilingSummaries => "collect_filing_summaries",
            JobType::Timeline => "collect_timeline",
            JobType::NewsIntel => "collect_news_intel",
            JobType::Signals => "compute_signals",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "collect_eod" => Some(JobType::Eod),
            "collect_eod_bulk" => Some(JobType::EodBulk),
            "collect_fundamentals" => Some(JobType::Fundamentals),
            "collect_filings" => Some(JobType::Filings),
            "collect_filing_pdfs" => Some(JobType::FilingPdfs),
            "collect_news" => Some(JobType::News),
            "collect_filing_summaries" => Some(JobType::FilingSummaries),
            "collect_timeline" => Some(JobType::Timeline),
            "collect_news_intel" => Some(JobType::NewsIntel),
            "compute_signals" => Some(JobType::Signals),
            _ => None,
        }
    }

    /// Dequeue-order default (higher dequeues earlier).
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::Eod | JobType::EodBulk => 10,
            JobType::Signals => 9,
            JobType::Fundamentals => 8,
            JobType::News => 7,
            JobType::Filings => 5,
            JobType::NewsIntel | JobType::FilingPdfs => 4,
            JobType::FilingSummaries => 3,
            JobType::Timeline => 2,
        }
    }

    /// The index column stamped when a job of this type succeeds. Bulk EOD
    /// has none: the bulk collector stamps each ticker itself.
    pub fn timestamp_field(&self) -> Option<TimestampField> {
        match self {
            JobType::Eod => Some(TimestampField::Eod),
            JobType::EodBulk => None,
            JobType::Fundamentals => Some(TimestampField::Fundamentals),
            JobType::Filings => Some(TimestampField::Filings),
            JobType::FilingPdfs => Some(TimestampField::FilingsPdfs),
            JobType::News => Some(TimestampField::News),
            JobType::FilingSummaries => Some(TimestampField::FilingSummaries),
            JobType::Timeline => Some(TimestampField::Timeline),
            JobType::NewsIntel => Some(TimestampField::NewsIntel),
            JobType::Signals => Some(TimestampField::Signals),
        }
    }

    /// Staleness threshold for this type under the given policy.
    pub fn threshold(&self, policy: &FreshnessPolicy) -> Duration {
        match self {
            JobType::Eod | JobType::EodBulk => policy.eod,
            JobType::Fundamentals => policy.fundamentals,
            JobType::Filings => policy.filings,
            JobType::FilingPdfs => policy.filing_pdfs,
            JobType::News => policy.news,
            JobType::FilingSummaries => policy.filing_summaries,
            JobType::Timeline => policy.timeline,
            JobType::NewsIntel => policy.news_intel,
            JobType::Signals => policy.signals,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of collection work.
///
/// `ticker` holds a qualified instrument ticker, or a bare exchange code
/// for `collect_eod_bulk`. Mutated only by the worker that dequeued it.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub job_type: String,
    pub ticker: String,
    #[builder(default = 0)]
    pub priority: i32,
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    /// Empty unless the job failed.
    #[builder(default)]
    pub error: String,
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default = 0)]
    pub duration_ms: i64,
}

impl Job {
    /// Pending job for a type and target at the given priority.
    pub fn new(
        job_type: JobType,
        target: impl Into<String>,
        priority: i32,
        max_attempts: i32,
    ) -> Self {
        Self::builder()
            .job_type(job_type.as_str())
            .ticker(target.into())
            .priority(priority)
            .max_attempts(max_attempts)
            .build()
    }

    /// The parsed job type, `None` for unrecognized strings.
    pub fn kind(&self) -> Option<JobType> {
        JobType::parse(&self.job_type)
    }

    /// Whether a further failure should re-enqueue rather than terminate.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
