//! Stock index model: one row per tracked instrument.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::ticker::split_ticker;

/// Which write path most recently observed the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "stock_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Portfolio,
    Watchlist,
    Search,
    #[default]
    Manual,
}

/// One tracked instrument with per-component collection timestamps.
///
/// `None` in a collection column means the component was never collected
/// and is therefore stale.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct StockEntry {
    /// Fully qualified ticker (`CODE.EXCHANGE`), the primary key.
    pub ticker: String,
    pub code: String,
    pub exchange: String,
    pub name: String,
    pub source: Source,

    pub eod_collected_at: Option<DateTime<Utc>>,
    pub fundamentals_collected_at: Option<DateTime<Utc>>,
    pub filings_collected_at: Option<DateTime<Utc>>,
    pub filings_pdfs_collected_at: Option<DateTime<Utc>>,
    pub news_collected_at: Option<DateTime<Utc>>,
    pub filing_summaries_collected_at: Option<DateTime<Utc>>,
    pub timeline_collected_at: Option<DateTime<Utc>>,
    pub signals_collected_at: Option<DateTime<Utc>>,
    pub news_intel_collected_at: Option<DateTime<Utc>>,

    /// First observation of the ticker, never moved by later upserts.
    pub added_at: DateTime<Utc>,
    /// Most recent observation through any write path.
    pub last_seen_at: DateTime<Utc>,
}

impl StockEntry {
    /// Build a fresh entry for a qualified ticker. Collection timestamps
    /// start unset; `upsert` owns the lifecycle stamps.
    pub fn new(ticker: impl Into<String>, name: impl Into<String>, source: Source) -> Self {
        let ticker = ticker.into();
        let (code, exchange) = split_ticker(&ticker);
        let now = Utc::now();
        Self {
            code: code.to_string(),
            exchange: exchange.to_string(),
            ticker,
            name: name.into(),
            source,
            eod_collected_at: None,
            fundamentals_collected_at: None,
            filings_collected_at: None,
            filings_pdfs_collected_at: None,
            news_collected_at: None,
            filing_summaries_collected_at: None,
            timeline_collected_at: None,
            signals_collected_at: None,
            news_intel_collected_at: None,
            added_at: now,
            last_seen_at: now,
        }
    }

    /// Read the collection timestamp behind a whitelisted field.
    pub fn collected_at(&self, field: TimestampField) -> Option<DateTime<Utc>> {
        match field {
            TimestampField::Eod => self.eod_collected_at,
            TimestampField::Fundamentals => self.fundamentals_collected_at,
            TimestampField::Filings => self.filings_collected_at,
            TimestampField::FilingsPdfs => self.filings_pdfs_collected_at,
            TimestampField::News => self.news_collected_at,
            TimestampField::FilingSummaries => self.filing_summaries_collected_at,
            TimestampField::Timeline => self.timeline_collected_at,
            TimestampField::Signals => self.signals_collected_at,
            TimestampField::NewsIntel => self.news_intel_collected_at,
        }
    }

    /// Write a collection timestamp. Stored values never move backwards.
    pub(crate) fn set_collected_at(&mut self, field: TimestampField, ts: DateTime<Utc>) {
        let slot = match field {
            TimestampField::Eod => &mut self.eod_collected_at,
            TimestampField::Fundamentals => &mut self.fundamentals_collected_at,
            TimestampField::Filings => &mut self.filings_collected_at,
            TimestampField::FilingsPdfs => &mut self.filings_pdfs_collected_at,
            TimestampField::News => &mut self.news_collected_at,
            TimestampField::FilingSummaries => &mut self.filing_summaries_collected_at,
            TimestampField::Timeline => &mut self.timeline_collected_at,
            TimestampField::Signals => &mut self.signals_collected_at,
            TimestampField::NewsIntel => &mut self.news_intel_collected_at,
        };
        match *slot {
            Some(prev) if prev > ts => {}
            _ => *slot = Some(ts),
        }
    }

    /// Drop every collection timestamp (fresh-insert state).
    pub(crate) fn reset_collections(&mut self) {
        self.eod_collected_at = None;
        self.fundamentals_collected_at = None;
        self.filings_collected_at = None;
        self.filings_pdfs_collected_at = None;
        self.news_collected_at = None;
        self.filing_summaries_collected_at = None;
        self.timeline_collected_at = None;
        self.signals_collected_at = None;
        self.news_intel_collected_at = None;
    }
}

/// The fixed set of freshness columns `update_timestamp` may touch.
///
/// Field names arrive as strings from job dispatch and admin tooling; they
/// are validated here before any query interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampField {
    Eod,
    Fundamentals,
    Filings,
    FilingsPdfs,
    News,
    FilingSummaries,
    Timeline,
    Signals,
    NewsIntel,
}

impl TimestampField {
    pub const ALL: [TimestampField; 9] = [
        TimestampField::Eod,
        TimestampField::Fundamentals,
        TimestampField::Filings,
        TimestampField::FilingsPdfs,
        TimestampField::News,
        TimestampField::FilingSummaries,
        TimestampField::Timeline,
        TimestampField::Signals,
        TimestampField::NewsIntel,
    ];

    /// The column name, exactly as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampField::Eod => "eod_collected_at",
            TimestampField::Fundamentals => "fundamentals_collected_at",
            TimestampField::Filings => "filings_collected_at",
            TimestampField::FilingsPdfs => "filings_pdfs_collected_at",
            TimestampField::News => "news_collected_at",
            TimestampField::FilingSummaries => "filing_summaries_collected_at",
            TimestampField::Timeline => "timeline_collected_at",
            TimestampField::Signals => "signals_collected_at",
            TimestampField::NewsIntel => "news_intel_collected_at",
        }
    }

    /// Whitelist lookup. Anything outside the fixed set is refused.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }
}

/// Rejected `update_timestamp` field name.
#[derive(Debug, thiserror::Error)]
#[error("unknown timestamp field: {0}")]
pub struct UnknownTimestampField(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_splits_ticker() {
        let entry = StockEntry::new("BHP.AU", "BHP Group", Source::Portfolio);
        assert_eq!(entry.code, "BHP");
        assert_eq!(entry.exchange, "AU");
        assert_eq!(entry.source, Source::Portfolio);
    }

    #[test]
    fn new_entry_has_no_collections() {
        let entry = StockEntry::new("BHP.AU", "BHP Group", Source::Manual);
        for field in TimestampField::ALL {
            assert!(entry.collected_at(field).is_none());
        }
        assert_eq!(entry.added_at, entry.last_seen_at);
    }

    #[test]
    fn whitelist_accepts_every_fixed_field() {
        for field in TimestampField::ALL {
            assert_eq!(TimestampField::parse(field.as_str()), Some(field));
        }
    }

    #[test]
    fn whitelist_rejects_everything_else() {
        assert!(TimestampField::parse("added_at").is_none());
        assert!(TimestampField::parse("ticker").is_none());
        assert!(TimestampField::parse("eod_collected_at; DROP TABLE jobs").is_none());
        assert!(TimestampField::parse("").is_none());
    }

    #[test]
    fn set_collected_at_never_regresses() {
        let mut entry = StockEntry::new("BHP.AU", "BHP Group", Source::Manual);
        let later = Utc::now();
        let earlier = later - chrono::Duration::minutes(5);

        entry.set_collected_at(TimestampField::Eod, later);
        entry.set_collected_at(TimestampField::Eod, earlier);
        assert_eq!(entry.eod_collected_at, Some(later));
    }
}
