//! Job executor.
//!
//! A queue delivers `(workflow_id, task_id)` jobs to [`Worker::perform`]. The
//! worker rehydrates the task, runs its handler, maps the [`TaskOutcome`] to
//! a status transition, persists the task (which may finalize the workflow),
//! and then enqueues or inline-runs whichever children became ready.
//!
//! Delivery may be duplicated. Every step is guarded by the persisted status,
//! so a repeat delivery of a finished task does nothing.

use std::collections::HashSet;
use std::sync::Arc;

use taskflow_types::error::FlowError;
use taskflow_types::job::JobPayload;
use taskflow_types::task::TaskState;
use thiserror::Error;

use crate::client::Client;
use crate::now_ts;
use crate::queue::JobQueue;
use crate::storage::StorageAdapter;
use crate::task::{TaskContext, TaskHandlerRegistry, TaskOutcome};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// The task failed and awaits redelivery; the queue should retry the job.
    #[error("task '{task_id}' in workflow '{workflow_id}' failed, retry requested: {message}")]
    Retry {
        workflow_id: String,
        task_id: String,
        message: String,
    },
}

impl WorkerError {
    pub fn is_retry(&self) -> bool {
        matches!(self, WorkerError::Retry { .. })
    }
}

pub struct Worker<A, Q> {
    client: Arc<Client<A, Q>>,
    handlers: Arc<TaskHandlerRegistry>,
}

impl<A, Q> Clone for Worker<A, Q> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

impl<A: StorageAdapter, Q: JobQueue> Worker<A, Q> {
    pub fn new(client: Arc<Client<A, Q>>, handlers: TaskHandlerRegistry) -> Self {
        Self {
            client,
            handlers: Arc::new(handlers),
        }
    }

    pub fn client(&self) -> &Arc<Client<A, Q>> {
        &self.client
    }

    /// Fail fast when any of `task_ids` has no registered handler.
    pub fn ensure_handlers<I, S>(&self, task_ids: I) -> Result<(), FlowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.handlers.ensure_covers(task_ids)
    }

    /// Execute one delivered job, then everything it makes runnable inline.
    ///
    /// Returns [`WorkerError::Retry`] when the task failed with retries left;
    /// the queue is expected to redeliver the same job.
    #[tracing::instrument(
        name = "perform",
        skip(self, job),
        fields(workflow_id = %job.workflow_id, task_id = %job.task_id)
    )]
    pub async fn perform(&self, job: &JobPayload) -> Result<(), WorkerError> {
        let workflow_id = job.workflow_id.as_str();
        let Some(task) = self.run_one(workflow_id, &job.task_id).await? else {
            return Ok(());
        };

        let mut stack: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        self.propagate(workflow_id, &task, &mut stack, &mut seen)
            .await?;

        while let Some(child_id) = stack.pop() {
            match self.run_one(workflow_id, &child_id).await {
                Ok(Some(child)) => {
                    self.propagate(workflow_id, &child, &mut stack, &mut seen)
                        .await?;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        workflow_id,
                        task_id = %child_id,
                        error = %e,
                        "inline task failed"
                    );
                    self.reschedule_inline(workflow_id, &child_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Called by the queue once redeliveries are used up.
    pub async fn on_retries_exhausted(&self, job: &JobPayload) -> Result<(), FlowError> {
        let mut task = self.client.find_task(&job.workflow_id, &job.task_id).await?;
        if !task.is_succeeded() {
            task.fail();
        }
        tracing::warn!(
            workflow_id = %job.workflow_id,
            task_id = %job.task_id,
            "task retries exhausted"
        );
        self.client.store_task(&job.workflow_id, &task).await
    }

    /// Run a single task if its status allows. Returns the persisted task,
    /// or None when the delivery was a no-op.
    async fn run_one(
        &self,
        workflow_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskState>, WorkerError> {
        let workflow = self.client.find_workflow(workflow_id).await?;
        let mut task = workflow.task(task_id)?.clone();
        tracing::info!(workflow_id, task_id, status = %task.status, "task started");

        if !task.inline && !task.is_enqueued() && !task.is_awaiting_retry() {
            tracing::debug!(workflow_id, task_id, status = %task.status, "task not runnable");
            return Ok(None);
        }
        if task.is_succeeded() {
            tracing::info!(workflow_id, task_id, "task already succeeded");
            return Ok(None);
        }

        let handler = self
            .handlers
            .get(task_id)
            .ok_or_else(|| FlowError::UnknownTaskType(task_id.to_string()))?;
        let ctx = TaskContext {
            workflow_id: workflow_id.to_string(),
            task: task.clone(),
            workflow_params: workflow.params().clone(),
        };
        let now = now_ts();

        if handler.auto_succeed(&ctx) {
            task.succeed();
            tracing::info!(workflow_id, task_id, "task succeeded");
        } else if task.is_expired(now) {
            tracing::warn!(workflow_id, task_id, "task expired");
            task.set_error_msg("expired");
            task.fail();
        } else {
            match handler.perform(&ctx).await {
                Ok(TaskOutcome::Succeeded) => {
                    task.succeed();
                    tracing::info!(workflow_id, task_id, "task succeeded");
                }
                Ok(TaskOutcome::Skip) => {
                    task.skip();
                    tracing::info!(workflow_id, task_id, "task skipped");
                }
                Ok(TaskOutcome::Repeat) => {
                    let at = now.saturating_add(task.loop_interval as i64);
                    tracing::info!(workflow_id, task_id, at, "task repeat scheduled");
                    self.client.enqueue_task(workflow_id, &mut task, Some(at)).await?;
                }
                Ok(TaskOutcome::TryLater(delay)) => {
                    let at = now.saturating_add(delay.as_secs() as i64);
                    tracing::info!(workflow_id, task_id, at, "task try-later scheduled");
                    self.client.enqueue_task(workflow_id, &mut task, Some(at)).await?;
                }
                Ok(TaskOutcome::TriggerManually) => {
                    task.clear();
                    task.clear_dates();
                    tracing::info!(
                        workflow_id,
                        task_id,
                        "task set to pending (to be triggered manually)"
                    );
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    task.set_error_msg(message.clone());
                    if task.has_no_retries() {
                        task.fail();
                        tracing::error!(workflow_id, task_id, error = %message, "task failed (no retries)");
                    } else {
                        task.await_retry();
                        tracing::error!(workflow_id, task_id, error = %message, "task failed (retries present)");
                        self.client.store_task(workflow_id, &task).await?;
                        return Err(WorkerError::Retry {
                            workflow_id: workflow_id.to_string(),
                            task_id: task_id.to_string(),
                            message,
                        });
                    }
                }
            }
        }

        self.client.store_task(workflow_id, &task).await?;
        Ok(Some(task))
    }

    /// Enqueue the children of `task` that became ready; queue inline-ready
    /// ones on `stack` instead.
    async fn propagate(
        &self,
        workflow_id: &str,
        task: &TaskState,
        stack: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) -> Result<(), FlowError> {
        if task.is_pending() || task.children.is_empty() {
            return Ok(());
        }

        let mut workflow = self.client.find_workflow(workflow_id).await?;
        let rules = self.client.rules();
        let now = now_ts();
        let lookahead = self.client.config().inline_lookahead_secs;

        let mut inline = Vec::new();
        for child_id in &task.children {
            if !workflow.ready_to_start(child_id, rules)? {
                continue;
            }
            let child = workflow.task_mut(child_id)?;
            if child.is_ready_to_perform_inline(now, lookahead) {
                if seen.insert(child_id.clone()) {
                    inline.push(child_id.clone());
                }
            } else {
                self.client.enqueue_task(workflow_id, child, None).await?;
            }
        }

        // Declaration order once popped.
        stack.extend(inline.into_iter().rev());
        Ok(())
    }

    async fn reschedule_inline(&self, workflow_id: &str, task_id: &str) -> Result<(), FlowError> {
        let mut task = self.client.find_task(workflow_id, task_id).await?;
        if task.is_awaiting_retry() {
            let at = now_ts().saturating_add(self.client.config().inline_retry_delay_secs);
            self.client.enqueue_task(workflow_id, &mut task, Some(at)).await?;
        }
        Ok(())
    }
}
