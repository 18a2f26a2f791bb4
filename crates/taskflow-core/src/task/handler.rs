//! The `TaskHandler` trait and what a handler hands back to the worker.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use taskflow_types::task::TaskState;

/// What a successful `perform` asks the worker to do next.
///
/// Runtime failures are the `Err` side of [`TaskHandler::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// Finish without doing the work; counts as done for `all_done` children.
    Skip,
    /// Run again after the task's `loop_interval`.
    Repeat,
    /// Run again after the given delay.
    TryLater(Duration),
    /// Return to pending and wait for an explicit `start_task`.
    TriggerManually,
}

/// Everything a handler gets to see about the task it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub workflow_id: String,
    /// Snapshot taken right before `perform`.
    pub task: TaskState,
    pub workflow_params: Value,
}

impl TaskContext {
    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    /// Task-level params.
    pub fn params(&self) -> &Value {
        &self.task.params
    }

    /// Look up a param on the task first, then on the workflow.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.task
            .params
            .get(name)
            .or_else(|| self.workflow_params.get(name))
    }
}

/// Executes one task type.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// For dynamic dispatch, see [`super::BoxTaskHandler`].
pub trait TaskHandler: Send + Sync {
    fn perform(
        &self,
        ctx: &TaskContext,
    ) -> impl Future<Output = anyhow::Result<TaskOutcome>> + Send;

    /// Mark the task succeeded without calling `perform`.
    fn auto_succeed(&self, _ctx: &TaskContext) -> bool {
        false
    }
}

/// Handler built from an async closure.
pub struct FnTaskHandler<F> {
    f: F,
    auto_succeed: bool,
}

impl<F> FnTaskHandler<F> {
    pub fn with_auto_succeed(mut self, auto_succeed: bool) -> Self {
        self.auto_succeed = auto_succeed;
        self
    }
}

/// Wrap an async closure as a [`TaskHandler`].
pub fn from_fn<F, Fut>(f: F) -> FnTaskHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskOutcome>> + Send,
{
    FnTaskHandler {
        f,
        auto_succeed: false,
    }
}

impl<F, Fut> TaskHandler for FnTaskHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskOutcome>> + Send,
{
    fn perform(
        &self,
        ctx: &TaskContext,
    ) -> impl Future<Output = anyhow::Result<TaskOutcome>> + Send {
        (self.f)(ctx.clone())
    }

    fn auto_succeed(&self, _ctx: &TaskContext) -> bool {
        self.auto_succeed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TaskContext {
        TaskContext {
            workflow_id: "wf".to_string(),
            task: TaskState::new("t").with_params(json!({"a": 1})),
            workflow_params: json!({"a": 0, "b": 2}),
        }
    }

    #[test]
    fn test_param_lookup_prefers_task() {
        let ctx = ctx();
        assert_eq!(ctx.param("a"), Some(&json!(1)));
        assert_eq!(ctx.param("b"), Some(&json!(2)));
        assert_eq!(ctx.param("c"), None);
        assert_eq!(ctx.task_id(), "t");
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = from_fn(|ctx: TaskContext| async move {
            if ctx.param("a").is_some() {
                Ok(TaskOutcome::Succeeded)
            } else {
                Ok(TaskOutcome::Skip)
            }
        });
        assert_eq!(handler.perform(&ctx()).await.unwrap(), TaskOutcome::Succeeded);
        assert!(!handler.auto_succeed(&ctx()));
        assert!(handler.with_auto_succeed(true).auto_succeed(&ctx()));
    }
}
