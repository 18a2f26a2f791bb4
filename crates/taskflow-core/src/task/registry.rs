//! Handler registry keyed by task id.

use std::collections::HashMap;

use taskflow_types::error::FlowError;

use super::box_handler::BoxTaskHandler;
use super::handler::TaskHandler;

/// Maps task ids to the handlers that execute them.
pub struct TaskHandlerRegistry {
    handlers: HashMap<String, BoxTaskHandler>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler; replaces any previous one for the same id.
    pub fn register(&mut self, task_id: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.handlers
            .insert(task_id.into(), BoxTaskHandler::new(handler));
    }

    pub fn get(&self, task_id: &str) -> Option<&BoxTaskHandler> {
        self.handlers.get(task_id)
    }

    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Fail with the first task id that has no handler.
    pub fn ensure_covers<I, S>(&self, task_ids: I) -> Result<(), FlowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in task_ids {
            let id = id.as_ref();
            if !self.handlers.contains_key(id) {
                return Err(FlowError::UnknownTaskType(id.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for TaskHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
