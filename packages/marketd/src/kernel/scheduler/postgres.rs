//! PostgreSQL-backed job queue.
//!
//! Dequeue claims through a `FOR UPDATE SKIP LOCKED` CTE so concurrent
//! workers never observe the same job.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::job::Job;
use super::queue::JobQueue;

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, mut job: Job) -> Result<Job> {
        if job.id.is_nil() {
            job.id = Uuid::new_v4();
        }

        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, job_type, ticker, priority, status, created_at,
                started_at, completed_at, error, attempts, max_attempts, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                job_type = EXCLUDED.job_type,
                ticker = EXCLUDED.ticker,
                priority = EXCLUDED.priority,
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                error = EXCLUDED.error,
                attempts = EXCLUDED.attempts,
                max_attempts = EXCLUDED.max_attempts,
                duration_ms = EXCLUDED.duration_ms
            RETURNING id, job_type, ticker, priority, status, created_at,
                      started_at, completed_at, error, attempts, max_attempts, duration_ms
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.ticker)
        .bind(job.priority)
        .bind(job.status)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.duration_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                started_at = NOW(),
                attempts = attempts + 1
            WHERE id IN (SELECT id FROM next_job)
            RETURNING id, job_type, ticker, priority, status, created_at,
                      started_at, completed_at, error, attempts, max_attempts, duration_ms
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = CASE WHEN $2 <> '' THEN 'failed'::job_status
                              ELSE 'completed'::job_status END,
                error = $2,
                completed_at = NOW(),
                duration_ms = $3
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(error.unwrap_or(""))
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled',
                completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled',
                completed_at = NOW()
            WHERE ticker = $1 AND status = 'pending'
            "#,
        )
        .bind(ticker)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<()> {
        sqlx::query("UPDATE jobs SET priority = $2 WHERE id = $1")
            .bind(id)
            .bind(priority)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn max_priority(&self) -> Result<i32> {
        let max = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(priority), 0) FROM jobs WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(max)
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<Job>> {
        let limit = if limit > 0 { Some(limit) } else { None };
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, ticker, priority, status, created_at,
                   started_at, completed_at, error, attempts, max_attempts, duration_ms
            FROM jobs
            WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn list_all(&self, limit: i64) -> Result<Vec<Job>> {
        let limit = if limit > 0 { Some(limit) } else { None };
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, ticker, priority, status, created_at,
                   started_at, completed_at, error, attempts, max_attempts, duration_ms
            FROM jobs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, ticker, priority, status, created_at,
                   started_at, completed_at, error, attempts, max_attempts, duration_ms
            FROM jobs
            WHERE ticker = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn count_pending(&self) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn has_pending(&self, job_type: &str, ticker: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM jobs
                WHERE job_type = $1 AND ticker = $2 AND status = 'pending'
            )
            "#,
        )
        .bind(job_type)
        .bind(ticker)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND completed_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reset_running(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                started_at = NULL
            WHERE status = 'running'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
