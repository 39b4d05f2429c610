//! Per-component freshness thresholds.
//!
//! Each collected component has a maximum age after which it is considered
//! stale and eligible for re-collection. The watcher compares stored
//! collection timestamps against these thresholds on every scan.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Maximum ages, one per collected component.
///
/// The shipped values order components by collection cost; hosts override
/// the whole struct to tune cadence.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub eod: Duration,
    pub fundamentals: Duration,
    pub filings: Duration,
    pub filing_pdfs: Duration,
    pub news: Duration,
    pub filing_summaries: Duration,
    pub timeline: Duration,
    pub signals: Duration,
    pub news_intel: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        const HOUR: u64 = 60 * 60;
        const DAY: u64 = 24 * HOUR;
        Self {
            eod: Duration::from_secs(DAY),
            fundamentals: Duration::from_secs(7 * DAY),
            filings: Duration::from_secs(DAY),
            filing_pdfs: Duration::from_secs(7 * DAY),
            news: Duration::from_secs(6 * HOUR),
            filing_summaries: Duration::from_secs(7 * DAY),
            timeline: Duration::from_secs(7 * DAY),
            signals: Duration::from_secs(DAY),
            news_intel: Duration::from_secs(12 * HOUR),
        }
    }
}

impl FreshnessPolicy {
    /// Whether a component collected at `collected_at` is still fresh
    /// under `threshold`. A component that was never collected is stale.
    pub fn is_fresh(&self, collected_at: Option<DateTime<Utc>>, threshold: Duration) -> bool {
        match collected_at {
            None => false,
            Some(ts) => {
                let threshold =
                    chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
                Utc::now().signed_duration_since(ts) < threshold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_collected_is_stale() {
        let policy = FreshnessPolicy::default();
        assert!(!policy.is_fresh(None, Duration::from_secs(60)));
    }

    #[test]
    fn recent_collection_is_fresh() {
        let policy = FreshnessPolicy::default();
        assert!(policy.is_fresh(Some(Utc::now()), Duration::from_secs(60)));
    }

    #[test]
    fn old_collection_is_stale() {
        let policy = FreshnessPolicy::default();
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        assert!(!policy.is_fresh(Some(two_hours_ago), Duration::from_secs(3600)));
    }
}
