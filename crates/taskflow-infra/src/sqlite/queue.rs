//! SQLite job queue.
//!
//! Implements `JobQueue` from `taskflow-core` on the `jobs` table. Pollers
//! claim the earliest due job with a visibility lease (`claimed_until`); a
//! job whose lease expired without completion becomes claimable again, which
//! gives at-least-once delivery across crashes.

use chrono::Utc;
use sqlx::Row;
use taskflow_core::queue::JobQueue;
use taskflow_types::error::QueueError;
use taskflow_types::job::{JobPayload, JobRequest};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::queue_err;

/// SQLite-backed implementation of `JobQueue`.
pub struct SqliteJobQueue {
    pool: DatabasePool,
}

/// A job leased to one poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: String,
    pub request: JobRequest,
    /// Failed deliveries so far.
    pub attempts: u32,
}

impl ClaimedJob {
    pub fn payload(&self) -> &JobPayload {
        &self.request.payload
    }

    /// Whether another redelivery fits in the job's retry budget.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.request.retry_budget
    }
}

struct JobRow {
    id: String,
    workflow_id: String,
    task_id: String,
    queue: String,
    run_at: i64,
    retry_budget: i64,
    attempts: i64,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            task_id: row.try_get("task_id")?,
            queue: row.try_get("queue")?,
            run_at: row.try_get("run_at")?,
            retry_budget: row.try_get("retry_budget")?,
            attempts: row.try_get("attempts")?,
        })
    }

    fn into_claimed(self) -> ClaimedJob {
        ClaimedJob {
            id: self.id,
            request: JobRequest {
                payload: JobPayload::new(self.workflow_id, self.task_id),
                queue: self.queue,
                scheduled_at: self.run_at,
                retry_budget: u32::try_from(self.retry_budget).unwrap_or(0),
            },
            attempts: u32::try_from(self.attempts).unwrap_or(0),
        }
    }
}

impl SqliteJobQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Lease the earliest job due at `now` on any of `queues`.
    ///
    /// The job stays invisible to other pollers for `visibility_secs`.
    pub async fn claim(
        &self,
        queues: &[String],
        now: i64,
        visibility_secs: i64,
    ) -> Result<Option<ClaimedJob>, QueueError> {
        if queues.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; queues.len()].join(", ");
        let sql = format!(
            "SELECT id, workflow_id, task_id, queue, run_at, retry_budget, attempts
             FROM jobs
             WHERE queue IN ({placeholders})
               AND run_at <= ?
               AND (claimed_until IS NULL OR claimed_until <= ?)
             ORDER BY run_at ASC, id ASC
             LIMIT 1"
        );

        let mut tx = self.pool.writer.begin().await.map_err(queue_err)?;

        let mut query = sqlx::query(&sql);
        for queue in queues {
            query = query.bind(queue);
        }
        let row = query
            .bind(now)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(queue_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let job = JobRow::from_row(&row).map_err(queue_err)?.into_claimed();

        sqlx::query("UPDATE jobs SET claimed_until = ? WHERE id = ?")
            .bind(now.saturating_add(visibility_secs))
            .bind(&job.id)
            .execute(&mut *tx)
            .await
            .map_err(queue_err)?;

        tx.commit().await.map_err(queue_err)?;

        tracing::debug!(
            job_id = %job.id,
            workflow_id = %job.request.payload.workflow_id,
            task_id = %job.request.payload.task_id,
            attempts = job.attempts,
            "job claimed"
        );
        Ok(Some(job))
    }

    /// Delete a job that ran to completion.
    pub async fn complete(&self, id: &str) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool.writer)
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    /// Release a failed job for redelivery at `run_at`, counting the attempt.
    pub async fn retry(&self, id: &str, run_at: i64, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE jobs
             SET attempts = attempts + 1, run_at = ?, claimed_until = NULL, last_error = ?
             WHERE id = ?",
        )
        .bind(run_at)
        .bind(error)
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    /// Drop a job that will not be redelivered.
    pub async fn discard(&self, id: &str) -> Result<(), QueueError> {
        self.complete(id).await
    }

    /// Number of jobs in the table, claimed or not.
    pub async fn count(&self) -> Result<u64, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM jobs")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(queue_err)?;
        let n: i64 = row.try_get("n").map_err(queue_err)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, request: JobRequest) -> Result<(), QueueError> {
        let id = Uuid::now_v7().to_string();
        sqlx::query(
            "INSERT INTO jobs (id, workflow_id, task_id, queue, run_at, retry_budget, attempts, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(&request.payload.workflow_id)
        .bind(&request.payload.task_id)
        .bind(&request.queue)
        .bind(request.scheduled_at)
        .bind(i64::from(request.retry_budget))
        .bind(Utc::now().timestamp())
        .execute(&self.pool.writer)
        .await
        .map_err(queue_err)?;

        tracing::trace!(
            job_id = %id,
            workflow_id = %request.payload.workflow_id,
            task_id = %request.payload.task_id,
            queue = %request.queue,
            "job stored"
        );
        Ok(())
    }
}
