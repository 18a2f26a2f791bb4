//! In-process job queue for tests and embedded use.

use taskflow_types::error::QueueError;
use taskflow_types::job::JobRequest;
use tokio::sync::Mutex;

use super::JobQueue;

/// FIFO-by-schedule queue held in memory. No delivery loop of its own;
/// callers pop jobs and hand them to a worker.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<Vec<JobRequest>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the job with the earliest schedule, ignoring whether it is due.
    pub async fn pop_next(&self) -> Option<JobRequest> {
        let mut jobs = self.jobs.lock().await;
        let idx = earliest(&jobs, None)?;
        Some(jobs.remove(idx))
    }

    /// Remove the earliest job scheduled at or before `now`.
    pub async fn pop_due(&self, now: i64) -> Option<JobRequest> {
        let mut jobs = self.jobs.lock().await;
        let idx = earliest(&jobs, Some(now))?;
        Some(jobs.remove(idx))
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Snapshot of pending jobs in insertion order.
    pub async fn jobs(&self) -> Vec<JobRequest> {
        self.jobs.lock().await.clone()
    }
}

// Ties keep insertion order.
fn earliest(jobs: &[JobRequest], due_by: Option<i64>) -> Option<usize> {
    jobs.iter()
        .enumerate()
        .filter(|(_, j)| due_by.is_none_or(|now| j.scheduled_at <= now))
        .min_by_key(|(i, j)| (j.scheduled_at, *i))
        .map(|(i, _)| i)
}

impl JobQueue for MemoryQueue {
    async fn enqueue(&self, request: JobRequest) -> Result<(), QueueError> {
        tracing::trace!(
            workflow_id = %request.payload.workflow_id,
            task_id = %request.payload.task_id,
            scheduled_at = request.scheduled_at,
            "memory queue push"
        );
        self.jobs.lock().await.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_types::job::JobPayload;

    fn job(task: &str, at: i64) -> JobRequest {
        JobRequest {
            payload: JobPayload::new("wf", task),
            queue: "default".to_string(),
            scheduled_at: at,
            retry_budget: 0,
        }
    }

    #[tokio::test]
    async fn test_pop_next_orders_by_schedule() {
        let q = MemoryQueue::new();
        q.enqueue(job("late", 20)).await.unwrap();
        q.enqueue(job("early", 10)).await.unwrap();
        q.enqueue(job("early-2", 10)).await.unwrap();

        assert_eq!(q.pop_next().await.unwrap().payload.task_id, "early");
        assert_eq!(q.pop_next().await.unwrap().payload.task_id, "early-2");
        assert_eq!(q.pop_next().await.unwrap().payload.task_id, "late");
        assert!(q.pop_next().await.is_none());
    }

    #[tokio::test]
    async fn test_pop_due_respects_schedule() {
        let q = MemoryQueue::new();
        q.enqueue(job("future", 100)).await.unwrap();
        assert!(q.pop_due(50).await.is_none());
        assert_eq!(q.len().await, 1);
        assert_eq!(q.pop_due(100).await.unwrap().payload.task_id, "future");
        assert!(q.is_empty().await);
    }
}
