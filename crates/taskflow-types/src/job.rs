//! Job payloads exchanged with the external job queue.

use serde::{Deserialize, Serialize};

/// What a delivered job points at: one task of one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobPayload {
    pub workflow_id: String,
    pub task_id: String,
}

impl JobPayload {
    pub fn new(workflow_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            task_id: task_id.into(),
        }
    }
}

/// A request to schedule a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub payload: JobPayload,
    pub queue: String,
    /// Epoch seconds before which the job must not run.
    pub scheduled_at: i64,
    /// How many redeliveries the queue may attempt after a failure.
    pub retry_budget: u32,
}
