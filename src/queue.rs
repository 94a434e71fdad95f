//! Durable at-least-once work queue backed by SQLite.
//!
//! Handlers never manage retries themselves: success acks (deletes the
//! job), failure nacks, and the queue reschedules with exponential
//! backoff until the attempt budget is spent, after which the job is
//! parked for inspection. Claims expire, so a worker that dies mid-job
//! hands it back.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

pub const TOPIC_INGEST: &str = "ingest";
pub const TOPIC_CLASSIFY: &str = "classify";

/// Claimed jobs reappear after this long if neither acked nor nacked.
const CLAIM_TIMEOUT_SECS: i64 = 600;
const MAX_BACKOFF_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub topic: String,
    pub payload: String,
    pub attempts: i64,
}

#[derive(Clone)]
pub struct Queue {
    pool: SqlitePool,
    max_attempts: i64,
}

fn backoff_secs(attempts: i64) -> i64 {
    (1i64 << attempts.clamp(0, 20)).min(MAX_BACKOFF_SECS)
}

impl Queue {
    pub fn new(pool: SqlitePool, max_attempts: i64) -> Self {
        Self { pool, max_attempts }
    }

    pub async fn enqueue<T: Serialize + Sync>(&self, topic: &str, message: &T) -> Result<i64> {
        let payload = serde_json::to_string(message)?;
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO queue_jobs (topic, payload, run_after, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(topic)
        .bind(&payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Claim up to `limit` due jobs on `topic`, marking them so other
    /// consumers skip them until the claim expires.
    pub async fn claim_due(
        &self,
        topic: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let now_ts = now.timestamp();
        let claim_floor = now_ts - CLAIM_TIMEOUT_SECS;

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, topic, payload, attempts FROM queue_jobs
            WHERE topic = ? AND failed = 0 AND run_after <= ?
              AND (claimed_at IS NULL OR claimed_at <= ?)
            ORDER BY run_after ASC
            LIMIT ?
            "#,
        )
        .bind(topic)
        .bind(now_ts)
        .bind(claim_floor)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let jobs: Vec<Job> = rows
            .iter()
            .map(|row| Job {
                id: row.get("id"),
                topic: row.get("topic"),
                payload: row.get("payload"),
                attempts: row.get("attempts"),
            })
            .collect();

        for job in &jobs {
            sqlx::query("UPDATE queue_jobs SET claimed_at = ? WHERE id = ?")
                .bind(now_ts)
                .bind(job.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(jobs)
    }

    pub async fn ack(&self, job_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM queue_jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Return a failed job to the queue with backoff, or park it once
    /// the attempt budget is exhausted.
    pub async fn nack(&self, job: &Job, now: DateTime<Utc>) -> Result<()> {
        let attempts = job.attempts + 1;
        if attempts >= self.max_attempts {
            sqlx::query("UPDATE queue_jobs SET attempts = ?, failed = 1, claimed_at = NULL WHERE id = ?")
                .bind(attempts)
                .bind(job.id)
                .execute(&self.pool)
                .await?;
        } else {
            let run_after = now.timestamp() + backoff_secs(attempts);
            sqlx::query(
                "UPDATE queue_jobs SET attempts = ?, run_after = ?, claimed_at = NULL WHERE id = ?",
            )
            .bind(attempts)
            .bind(run_after)
            .bind(job.id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn pending_count(&self, topic: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_jobs WHERE topic = ? AND failed = 0",
        )
        .bind(topic)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn parked_count(&self, topic: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_jobs WHERE topic = ? AND failed = 1",
        )
        .bind(topic)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(5), 32);
        assert_eq!(backoff_secs(11), 2048);
        assert_eq!(backoff_secs(12), 3600);
        assert_eq!(backoff_secs(60), 3600);
    }
}
