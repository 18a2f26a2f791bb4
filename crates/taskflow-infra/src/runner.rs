//! Polling worker pool.
//!
//! Runs `concurrency` loops that claim due jobs from [`SqliteJobQueue`] and
//! hand them to [`SqliteWorker::perform`]. A failed job is redelivered with
//! polynomial backoff while its retry budget lasts; after that the worker's
//! exhaustion hook marks the task failed and the job is dropped.

use std::sync::Arc;
use std::time::Duration;

use taskflow_core::now_ts;
use taskflow_types::config::WorkerConfig;
use taskflow_types::error::QueueError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::SqliteWorker;
use crate::sqlite::queue::{ClaimedJob, SqliteJobQueue};

/// Seconds before redelivery number `attempts + 1`.
pub fn retry_delay_secs(attempts: u32) -> i64 {
    i64::from(attempts).saturating_pow(4).saturating_add(15)
}

/// Drives a [`SqliteWorker`] from the SQLite job table.
pub struct WorkerPool {
    worker: SqliteWorker,
    queue: Arc<SqliteJobQueue>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(worker: SqliteWorker, config: WorkerConfig) -> Self {
        let queue = worker.client().queue().clone();
        Self {
            worker,
            queue,
            config,
        }
    }

    /// Claim and process one due job. Returns false when nothing was due.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        claim_and_process(&self.worker, &self.queue, &self.config).await
    }

    /// Poll until `cancel` fires. In-flight jobs finish before this returns.
    pub async fn run(&self, cancel: CancellationToken) {
        let loops = self.config.concurrency.max(1);
        tracing::info!(
            loops,
            queues = ?self.config.queues,
            "worker pool started"
        );

        let mut set = JoinSet::new();
        for index in 0..loops {
            let worker = self.worker.clone();
            let queue = self.queue.clone();
            let config = self.config.clone();
            let cancel = cancel.clone();
            set.spawn(async move { poll_loop(index, worker, queue, config, cancel).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker loop panicked");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn poll_loop(
    index: usize,
    worker: SqliteWorker,
    queue: Arc<SqliteJobQueue>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    let idle = Duration::from_millis(config.poll_interval_ms);
    while !cancel.is_cancelled() {
        let processed = match claim_and_process(&worker, &queue, &config).await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::error!(loop_index = index, error = %e, "job polling failed");
                false
            }
        };
        if processed {
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(idle) => {}
        }
    }
    tracing::debug!(loop_index = index, "worker loop exited");
}

async fn claim_and_process(
    worker: &SqliteWorker,
    queue: &SqliteJobQueue,
    config: &WorkerConfig,
) -> Result<bool, QueueError> {
    let Some(job) = queue
        .claim(&config.queues, now_ts(), config.visibility_timeout_secs)
        .await?
    else {
        return Ok(false);
    };
    process(worker, queue, job).await?;
    Ok(true)
}

async fn process(
    worker: &SqliteWorker,
    queue: &SqliteJobQueue,
    job: ClaimedJob,
) -> Result<(), QueueError> {
    let err = match worker.perform(job.payload()).await {
        Ok(()) => return queue.complete(&job.id).await,
        Err(err) => err,
    };
    let message = err.to_string();

    if job.can_retry() {
        let run_at = now_ts().saturating_add(retry_delay_secs(job.attempts));
        tracing::warn!(
            job_id = %job.id,
            attempts = job.attempts + 1,
            run_at,
            error = %message,
            "job failed, redelivery scheduled"
        );
        return queue.retry(&job.id, run_at, &message).await;
    }

    if err.is_retry() {
        if let Err(e) = worker.on_retries_exhausted(job.payload()).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to record exhausted retries");
        }
    }
    tracing::error!(job_id = %job.id, error = %message, "job discarded");
    queue.discard(&job.id).await
}
