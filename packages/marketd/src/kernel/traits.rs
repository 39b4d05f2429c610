//! Collaborator seams the scheduler dispatches into.
//!
//! Collection work and signal computation live behind these traits so the
//! engine can be exercised with recorded fakes and the host can wire real
//! services at startup.

use anyhow::Result;
use async_trait::async_trait;

/// Fetch-and-persist collectors, one method per collected component.
///
/// Implementations own their output stores; the scheduler only records
/// when each component was last collected. Methods are idempotent per
/// ticker; `force` bypasses a collector's own incremental shortcuts.
#[async_trait]
pub trait BaseCollector: Send + Sync {
    /// Incremental end-of-day bars for a single ticker.
    async fn collect_eod(&self, ticker: &str, force: bool) -> Result<()>;

    /// End-of-day bars for every tracked ticker on one exchange,
    /// amortising API cost. The bulk path stamps each ticker's
    /// `eod_collected_at` itself through the stock index.
    async fn collect_eod_bulk(&self, exchange: &str) -> Result<()>;

    async fn collect_fundamentals(&self, ticker: &str, force: bool) -> Result<()>;

    /// Filing index only; fast.
    async fn collect_filings(&self, ticker: &str, force: bool) -> Result<()>;

    /// Filing PDF downloads; slow.
    async fn collect_filing_pdfs(&self, ticker: &str, force: bool) -> Result<()>;

    async fn collect_news(&self, ticker: &str, force: bool) -> Result<()>;

    /// AI summaries over recently fetched filings.
    async fn collect_filing_summaries(&self, ticker: &str, force: bool) -> Result<()>;

    async fn collect_timeline(&self, ticker: &str, force: bool) -> Result<()>;

    /// AI news-intelligence generation.
    async fn collect_news_intel(&self, ticker: &str, force: bool) -> Result<()>;
}

/// Technical-signal computation over already-collected market data.
#[async_trait]
pub trait BaseSignalService: Send + Sync {
    /// Load cached market data for the ticker, compute signals, persist
    /// them through the storage layer.
    async fn compute_signals(&self, ticker: &str) -> Result<()>;
}
