use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::MAX_JOB_ATTEMPTS;
use crate::error::{QueueError, QueueResult};

use super::{DequeuedJob, JobPayload, JobQueue};

#[derive(Clone)]
pub struct SqlxJobQueue {
    pool: SqlitePool,
}

impl SqlxJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_json(payload: &JobPayload) -> QueueResult<String> {
    serde_json::to_string(payload).map_err(|e| QueueError::BackendUnavailable(e.to_string()))
}

fn from_json(s: &str) -> QueueResult<JobPayload> {
    serde_json::from_str(s).map_err(|e| QueueError::BackendUnavailable(e.to_string()))
}

#[async_trait]
impl JobQueue for SqlxJobQueue {
    async fn enqueue(&self, key: &str, payload: JobPayload, delay: Duration) -> QueueResult<()> {
        let deadline = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let payload_json = to_json(&payload)?;
        sqlx::query(
            "INSERT INTO pending_jobs (job_key, payload_json, deadline, attempts) \
             VALUES (?, ?, ?, 0) ON CONFLICT(job_key) DO NOTHING",
        )
        .bind(key)
        .bind(payload_json)
        .bind(deadline.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, key_prefix: &str) -> QueueResult<u64> {
        let pattern = format!("{key_prefix}%");
        let result = sqlx::query("DELETE FROM pending_jobs WHERE job_key LIKE ?")
            .bind(pattern)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            debug!("cancelled {} pending job(s) under prefix {}", removed, key_prefix);
        }
        Ok(removed)
    }

    async fn dequeue_ready(&self) -> QueueResult<Option<DequeuedJob>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            "SELECT job_key, payload_json, attempts FROM pending_jobs \
             WHERE deadline <= ? ORDER BY deadline ASC LIMIT 1",
        )
        .bind(&now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let key: String = row.try_get("job_key")?;
        let payload_json: String = row.try_get("payload_json")?;
        let attempts: i64 = row.try_get("attempts")?;

        let deleted = sqlx::query("DELETE FROM pending_jobs WHERE job_key = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            // Another worker claimed it between our SELECT and DELETE.
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;

        Ok(Some(DequeuedJob {
            key,
            payload: from_json(&payload_json)?,
            attempts: attempts as i32,
        }))
    }

    async fn retry_or_dead_letter(
        &self,
        key: &str,
        payload: &JobPayload,
        attempts: i32,
        error: &str,
    ) -> QueueResult<()> {
        let next_attempts = attempts + 1;
        if next_attempts >= MAX_JOB_ATTEMPTS {
            warn!("dead-lettering job {} after {} attempts: {}", key, next_attempts, error);
            let payload_json = to_json(payload)?;
            sqlx::query(
                "INSERT INTO dead_letters (job_key, payload_json, attempts, last_error) \
                 VALUES (?, ?, ?, ?) ON CONFLICT(job_key) DO UPDATE SET \
                 attempts = excluded.attempts, last_error = excluded.last_error",
            )
            .bind(key)
            .bind(payload_json)
            .bind(next_attempts)
            .bind(error)
            .execute(&self.pool)
            .await?;
            return Ok(());
        }

        let payload_json = to_json(payload)?;
        sqlx::query(
            "INSERT INTO pending_jobs (job_key, payload_json, deadline, attempts) \
             VALUES (?, ?, ?, ?) ON CONFLICT(job_key) DO UPDATE SET \
             deadline = excluded.deadline, attempts = excluded.attempts",
        )
        .bind(key)
        .bind(payload_json)
        .bind(Utc::now().to_rfc3339())
        .bind(next_attempts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutboundCallJob;
    use crate::queue::JobPayload;

    async fn in_memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_payload() -> JobPayload {
        JobPayload::Outbound(OutboundCallJob {
            occurrence_id: "occ-1".to_string(),
            round_number: 1,
            pool_index: 0,
            pool_snapshot: vec!["emp-1".to_string()],
            provider_id: "prov-1".to_string(),
        })
    }

    #[tokio::test]
    async fn idempotent_re_enqueue_is_a_no_op() {
        let pool = in_memory_pool().await;
        let queue = SqlxJobQueue::new(pool);
        queue
            .enqueue("shift:occ-1:wave:1", sample_payload(), Duration::from_secs(0))
            .await
            .unwrap();
        queue
            .enqueue("shift:occ-1:wave:1", sample_payload(), Duration::from_secs(999))
            .await
            .unwrap();

        let job = queue.dequeue_ready().await.unwrap();
        assert!(job.is_some());
        let job = queue.dequeue_ready().await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn cancel_removes_by_prefix() {
        let pool = in_memory_pool().await;
        let queue = SqlxJobQueue::new(pool);
        queue
            .enqueue("shift:occ-1:wave:2", sample_payload(), Duration::from_secs(900))
            .await
            .unwrap();
        queue
            .enqueue("shift:occ-1:wave:3", sample_payload(), Duration::from_secs(1800))
            .await
            .unwrap();
        queue
            .enqueue("shift:occ-2:wave:2", sample_payload(), Duration::from_secs(900))
            .await
            .unwrap();

        let removed = queue.cancel("shift:occ-1:").await.unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn dead_letters_after_max_attempts() {
        let pool = in_memory_pool().await;
        let queue = SqlxJobQueue::new(pool.clone());
        let payload = sample_payload();
        queue
            .retry_or_dead_letter("shift:occ-1:wave:1", &payload, MAX_JOB_ATTEMPTS - 1, "boom")
            .await
            .unwrap();

        let dead_count: i64 = sqlx::query("SELECT COUNT(*) as c FROM dead_letters")
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("c")
            .unwrap();
        assert_eq!(dead_count, 1);
    }
}
