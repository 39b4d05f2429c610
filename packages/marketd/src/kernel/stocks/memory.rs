//! In-memory stock index for tests and embedded use.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::entry::{StockEntry, TimestampField, UnknownTimestampField};
use super::store::StockIndex;

/// `StockIndex` over a mutex-guarded map. Per-call atomicity holds
/// trivially under the lock.
#[derive(Default)]
pub struct MemoryStockIndex {
    entries: Mutex<HashMap<String, StockEntry>>,
}

impl MemoryStockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry verbatim, bypassing upsert's lifecycle stamping.
    /// Test seeding only: lets a scenario backdate `added_at` or start
    /// from a chosen collection state.
    pub async fn seed(&self, entry: StockEntry) {
        self.entries
            .lock()
            .await
            .insert(entry.ticker.clone(), entry);
    }
}

#[async_trait]
impl StockIndex for MemoryStockIndex {
    async fn upsert(&self, entry: StockEntry) -> Result<StockEntry> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        let stored = match entries.get_mut(&entry.ticker) {
            Some(existing) => {
                existing.code = entry.code;
                existing.exchange = entry.exchange;
                existing.name = entry.name;
                existing.source = entry.source;
                existing.last_seen_at = now;
                existing.clone()
            }
            None => {
                let mut fresh = entry;
                fresh.reset_collections();
                fresh.added_at = now;
                fresh.last_seen_at = now;
                entries.insert(fresh.ticker.clone(), fresh.clone());
                fresh
            }
        };

        Ok(stored)
    }

    async fn get(&self, ticker: &str) -> Result<Option<StockEntry>> {
        Ok(self.entries.lock().await.get(ticker).cloned())
    }

    async fn list(&self) -> Result<Vec<StockEntry>> {
        let mut entries: Vec<StockEntry> = self.entries.lock().await.values().cloned().collect();
        entries.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(entries)
    }

    async fn delete(&self, ticker: &str) -> Result<()> {
        self.entries.lock().await.remove(ticker);
        Ok(())
    }

    async fn update_timestamp(&self, ticker: &str, field: &str, ts: DateTime<Utc>) -> Result<()> {
        let field = TimestampField::parse(field)
            .ok_or_else(|| UnknownTimestampField(field.to_string()))?;

        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(ticker)
            .ok_or_else(|| anyhow!("no stock index entry for ticker {ticker}"))?;
        entry.set_collected_at(field, ts);

        Ok(())
    }
}
