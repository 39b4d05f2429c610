//! PostgreSQL-backed stock index.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::entry::{StockEntry, TimestampField, UnknownTimestampField};
use super::store::StockIndex;

pub struct PostgresStockIndex {
    pool: PgPool,
}

impl PostgresStockIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockIndex for PostgresStockIndex {
    async fn upsert(&self, entry: StockEntry) -> Result<StockEntry> {
        let row = sqlx::query_as::<_, StockEntry>(
            r#"
            INSERT INTO stock_index (ticker, code, exchange, name, source, added_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (ticker) DO UPDATE SET
                code = EXCLUDED.code,
                exchange = EXCLUDED.exchange,
                name = EXCLUDED.name,
                source = EXCLUDED.source,
                last_seen_at = NOW()
            RETURNING ticker, code, exchange, name, source,
                      eod_collected_at, fundamentals_collected_at, filings_collected_at,
                      filings_pdfs_collected_at, news_collected_at, filing_summaries_collected_at,
                      timeline_collected_at, signals_collected_at, news_intel_collected_at,
                      added_at, last_seen_at
            "#,
        )
        .bind(&entry.ticker)
        .bind(&entry.code)
        .bind(&entry.exchange)
        .bind(&entry.name)
        .bind(entry.source)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, ticker: &str) -> Result<Option<StockEntry>> {
        let entry = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT ticker, code, exchange, name, source,
                   eod_collected_at, fundamentals_collected_at, filings_collected_at,
                   filings_pdfs_collected_at, news_collected_at, filing_summaries_collected_at,
                   timeline_collected_at, signals_collected_at, news_intel_collected_at,
                   added_at, last_seen_at
            FROM stock_index
            WHERE ticker = $1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<StockEntry>> {
        let entries = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT ticker, code, exchange, name, source,
                   eod_collected_at, fundamentals_collected_at, filings_collected_at,
                   filings_pdfs_collected_at, news_collected_at, filing_summaries_collected_at,
                   timeline_collected_at, signals_collected_at, news_intel_collected_at,
                   added_at, last_seen_at
            FROM stock_index
            ORDER BY ticker
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn delete(&self, ticker: &str) -> Result<()> {
        sqlx::query("DELETE FROM stock_index WHERE ticker = $1")
            .bind(ticker)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_timestamp(&self, ticker: &str, field: &str, ts: DateTime<Utc>) -> Result<()> {
        // Whitelist before anything reaches the query: the column name is
        // interpolated, so only the fixed static names may pass.
        let field = TimestampField::parse(field)
            .ok_or_else(|| UnknownTimestampField(field.to_string()))?;

        let query = format!(
            "UPDATE stock_index \
             SET {col} = GREATEST(COALESCE({col}, 'epoch'::timestamptz), $1) \
             WHERE ticker = $2",
            col = field.as_str()
        );
        let result = sqlx::query(&query)
            .bind(ts)
            .bind(ticker)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("no stock index entry for ticker {ticker}");
        }

        Ok(())
    }
}
