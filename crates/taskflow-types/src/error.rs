use thiserror::Error;

use crate::task::TaskStatus;

/// Errors from the key-value store port (used by trait definitions in taskflow-core).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    /// Rename of a key that does not exist.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// Operation against a key holding a different kind of value.
    #[error("wrong type for key '{0}'")]
    WrongType(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors from the job queue port.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("job payload error: {0}")]
    Serialization(String),
}

/// Errors surfaced by the workflow engine.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("task '{task_id}' not found in workflow '{workflow_id}'")]
    TaskNotFound {
        workflow_id: String,
        task_id: String,
    },

    #[error("task '{task_id}' in workflow '{workflow_id}' cannot be started from status '{status}'")]
    TaskUnstartable {
        workflow_id: String,
        task_id: String,
        status: TaskStatus,
    },

    #[error("unknown trigger rule '{0}'")]
    UnknownTriggerRule(String),

    #[error("invalid options for trigger rule '{rule}': {reason}")]
    InvalidTriggerRule { rule: String, reason: String },

    #[error("unknown success check '{0}'")]
    UnknownSuccessCheck(String),

    #[error("no handler registered for task type '{0}'")]
    UnknownTaskType(String),

    #[error("invalid task graph: {0}")]
    InvalidGraph(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Serialization(e.to_string())
    }
}
