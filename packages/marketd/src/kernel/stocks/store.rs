//! Persistence contract for the stock index.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entry::StockEntry;

/// Storage for the cross-user instrument catalogue.
///
/// Each call is atomic on its own; callers never compose multi-call
/// transactions. Every external write path (portfolio sync, watchlist,
/// search, admin) funnels through `upsert`, so a cold path can never
/// clobber a warm entry's collection state. The scheduler itself writes
/// only through `update_timestamp`.
#[async_trait]
pub trait StockIndex: Send + Sync {
    /// Insert the entry, or refresh the existing row with the same ticker.
    ///
    /// Existing rows keep `added_at` and every collection timestamp; the
    /// caller's `source` wins and `last_seen_at` moves to now. New rows
    /// get both lifecycle stamps set to now and no collections.
    async fn upsert(&self, entry: StockEntry) -> Result<StockEntry>;

    async fn get(&self, ticker: &str) -> Result<Option<StockEntry>>;

    async fn list(&self) -> Result<Vec<StockEntry>>;

    async fn delete(&self, ticker: &str) -> Result<()>;

    /// Set exactly one named freshness column.
    ///
    /// `field` must be one of the fixed nine column names and is validated
    /// before storage is touched; anything else is an error. Stored values
    /// never move backwards.
    async fn update_timestamp(&self, ticker: &str, field: &str, ts: DateTime<Utc>) -> Result<()>;
}
