//! Client API for starting, inspecting, and steering workflows.
//!
//! The client is the only place that pushes jobs. Every push first marks the
//! task enqueued and persists it, so a worker that picks the job up always
//! finds the task in an executable state.

use std::sync::Arc;

use taskflow_types::config::FlowConfig;
use taskflow_types::error::FlowError;
use taskflow_types::job::{JobPayload, JobRequest};
use taskflow_types::task::TaskState;
use taskflow_types::workflow::WorkflowSummary;

use crate::now_ts;
use crate::queue::JobQueue;
use crate::storage::StorageAdapter;
use crate::workflow::{RuleRegistry, Workflow};

/// Entry point for workflow operations, generic over storage and queue.
pub struct Client<A, Q> {
    storage: A,
    queue: Arc<Q>,
    config: Arc<FlowConfig>,
    rules: Arc<RuleRegistry>,
}

impl<A: StorageAdapter, Q: JobQueue> Client<A, Q> {
    pub fn new(storage: A, queue: Arc<Q>, config: Arc<FlowConfig>, rules: Arc<RuleRegistry>) -> Self {
        Self {
            storage,
            queue,
            config,
            rules,
        }
    }

    pub fn storage(&self) -> &A {
        &self.storage
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Persist a new workflow and enqueue every task that is ready.
    ///
    /// Returns false without touching anything when an in-progress record
    /// with the same id already exists.
    pub async fn start_workflow(&self, workflow: &mut Workflow) -> Result<bool, FlowError> {
        let workflow_id = workflow.id().to_string();
        if self.storage.already_started(&workflow_id).await? {
            tracing::info!(workflow_id = %workflow_id, "workflow already started");
            return Ok(false);
        }
        workflow.validate_rules(&self.rules)?;

        self.storage.store_workflow(workflow, true).await?;

        let ready = workflow.find_ready_to_start_tasks(&self.rules)?;
        for task_id in &ready {
            let task = workflow.task_mut(task_id)?;
            self.enqueue_task(&workflow_id, task, None).await?;
        }

        tracing::info!(
            workflow_id = %workflow_id,
            tasks = workflow.tasks().len(),
            enqueued = ready.len(),
            "workflow started"
        );
        Ok(true)
    }

    /// Enqueue a pending task right now, regardless of its trigger rule.
    pub async fn start_task(&self, workflow_id: &str, task_id: &str) -> Result<(), FlowError> {
        let mut task = self.find_task(workflow_id, task_id).await?;
        if !task.is_pending() {
            return Err(FlowError::TaskUnstartable {
                workflow_id: workflow_id.to_string(),
                task_id: task_id.to_string(),
                status: task.status,
            });
        }
        self.enqueue_task(workflow_id, &mut task, Some(now_ts())).await
    }

    /// Reset a task and its whole downstream branch, then start the task.
    ///
    /// Returns false when the task is still in flight.
    pub async fn restart_task(&self, workflow_id: &str, task_id: &str) -> Result<bool, FlowError> {
        let mut workflow = self.find_workflow(workflow_id).await?;
        let status = workflow.task(task_id)?.status;
        if status.is_in_flight() {
            tracing::info!(workflow_id, task_id, status = %status, "restart skipped, task in flight");
            return Ok(false);
        }

        let cleared = workflow.clear_branch(task_id)?;
        self.storage.store_workflow(&mut workflow, false).await?;
        tracing::info!(workflow_id, task_id, cleared = cleared.len(), "branch cleared");

        self.start_task(workflow_id, task_id).await?;
        Ok(true)
    }

    /// Put a single task back to pending without a start date, so it waits for
    /// [`Client::start_task`]. Descendants are left alone.
    pub async fn clear_task(&self, workflow_id: &str, task_id: &str) -> Result<(), FlowError> {
        let mut task = self.find_task(workflow_id, task_id).await?;
        task.clear();
        task.clear_dates();
        self.storage.store_task(workflow_id, &task).await?;
        tracing::info!(workflow_id, task_id, "task cleared");
        Ok(())
    }

    pub async fn set_task_queue(
        &self,
        workflow_id: &str,
        task_id: &str,
        queue: &str,
    ) -> Result<(), FlowError> {
        let mut task = self.find_task(workflow_id, task_id).await?;
        task.set_queue(queue);
        self.storage.store_task(workflow_id, &task).await
    }

    /// Mark a task enqueued, persist it, and push its job.
    ///
    /// The job runs at `at`, else at the task's start date, else now.
    pub async fn enqueue_task(
        &self,
        workflow_id: &str,
        task: &mut TaskState,
        at: Option<i64>,
    ) -> Result<(), FlowError> {
        task.enqueue();
        self.storage.store_task(workflow_id, task).await?;

        let scheduled_at = at.or(task.start_date).unwrap_or_else(now_ts);
        self.queue
            .enqueue(JobRequest {
                payload: JobPayload::new(workflow_id, task.id.clone()),
                queue: task.queue.clone(),
                scheduled_at,
                retry_budget: task.retries,
            })
            .await?;

        tracing::info!(
            workflow_id,
            task_id = %task.id,
            queue = %task.queue,
            scheduled_at,
            "task enqueued"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence pass-through
    // -----------------------------------------------------------------------

    pub async fn store_workflow(&self, workflow: &mut Workflow, initial: bool) -> Result<(), FlowError> {
        self.storage.store_workflow(workflow, initial).await
    }

    pub async fn store_task(&self, workflow_id: &str, task: &TaskState) -> Result<(), FlowError> {
        self.storage.store_task(workflow_id, task).await
    }

    pub async fn find_workflow(&self, workflow_id: &str) -> Result<Workflow, FlowError> {
        self.storage.find_workflow(workflow_id).await
    }

    pub async fn find_task(&self, workflow_id: &str, task_id: &str) -> Result<TaskState, FlowError> {
        let workflow = self.find_workflow(workflow_id).await?;
        workflow.task(task_id).cloned()
    }

    pub async fn find_workflow_key(&self, workflow_id: &str) -> Result<Option<String>, FlowError> {
        self.storage.find_workflow_key(workflow_id).await
    }

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, FlowError> {
        self.storage.list_workflows().await
    }

    pub async fn destroy_workflow(&self, workflow_id: &str) -> Result<bool, FlowError> {
        self.storage.destroy_workflow(workflow_id).await
    }

    pub async fn destroy_succeeded_workflows(&self) -> Result<usize, FlowError> {
        self.storage.destroy_succeeded_workflows().await
    }
}
