//! BoxTaskHandler -- object-safe dynamic dispatch wrapper for TaskHandler.
//!
//! 1. `TaskHandlerDyn` is the object-safe variant with boxed futures
//! 2. Blanket impl of `TaskHandlerDyn` for all `T: TaskHandler`
//! 3. `BoxTaskHandler` wraps `Box<dyn TaskHandlerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use super::handler::{TaskContext, TaskHandler, TaskOutcome};

/// Object-safe version of [`TaskHandler`] with boxed futures.
pub trait TaskHandlerDyn: Send + Sync {
    fn perform_boxed<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TaskOutcome>> + Send + 'a>>;

    fn auto_succeed_dyn(&self, ctx: &TaskContext) -> bool;
}

impl<T: TaskHandler> TaskHandlerDyn for T {
    fn perform_boxed<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TaskOutcome>> + Send + 'a>> {
        Box::pin(self.perform(ctx))
    }

    fn auto_succeed_dyn(&self, ctx: &TaskContext) -> bool {
        self.auto_succeed(ctx)
    }
}

/// Type-erased task handler, so one registry can hold every task type.
pub struct BoxTaskHandler {
    inner: Box<dyn TaskHandlerDyn>,
}

impl BoxTaskHandler {
    pub fn new<T: TaskHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub async fn perform(&self, ctx: &TaskContext) -> anyhow::Result<TaskOutcome> {
        self.inner.perform_boxed(ctx).await
    }

    pub fn auto_succeed(&self, ctx: &TaskContext) -> bool {
        self.inner.auto_succeed_dyn(ctx)
    }
}
