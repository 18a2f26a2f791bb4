//! Workflow-level metadata stored alongside the task fields of an aggregate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hash field that holds the serialized [`WorkflowMeta`] inside an aggregate.
/// No task may use this id.
pub const META_FIELD: &str = "__workflow__";

/// When a workflow counts as succeeded, which finalizes its storage key.
///
/// Stored with the workflow so any worker process can evaluate it after
/// rehydration without knowing which code built the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// A designated terminal (or sentinel) task has succeeded.
    TaskSucceeded { task: String },
    /// Every task has succeeded.
    AllSucceeded,
    /// A check registered by name in the rule registry.
    Named { name: String },
    /// Never finalizes on its own.
    Never,
}

impl Default for SuccessPolicy {
    fn default() -> Self {
        SuccessPolicy::Never
    }
}

/// Persisted attributes of a workflow, excluding its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMeta {
    pub id: String,
    /// Shared context handed to every task.
    #[serde(default = "empty_object")]
    pub params: Value,
    #[serde(default)]
    pub success: SuccessPolicy,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    /// Index set currently holding the aggregate (set encoding only).
    #[serde(default)]
    pub current_set: Option<String>,
    /// Task ids in declaration order; the hash itself is unordered.
    #[serde(default)]
    pub tasks: Vec<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl WorkflowMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: empty_object(),
            success: SuccessPolicy::default(),
            start_timestamp: None,
            end_timestamp: None,
            updated_at: None,
            current_set: None,
            tasks: Vec::new(),
        }
    }
}

/// One row of a workflow listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    /// Storage key currently holding the aggregate.
    pub key: String,
    pub start_timestamp: i64,
    /// `None` while the workflow is still in progress.
    pub end_timestamp: Option<i64>,
}

impl WorkflowSummary {
    pub fn is_finished(&self) -> bool {
        self.end_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_policy_tagged_json() {
        let policy = SuccessPolicy::TaskSucceeded {
            task: "publish".to_string(),
        };
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["kind"], "task_succeeded");
        assert_eq!(json["task"], "publish");

        let back: SuccessPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_meta_defaults_when_fields_missing() {
        let meta: WorkflowMeta = serde_json::from_str(r#"{"id":"order-7"}"#).unwrap();
        assert_eq!(meta.id, "order-7");
        assert_eq!(meta.success, SuccessPolicy::Never);
        assert!(meta.params.is_object());
        assert!(meta.tasks.is_empty());
    }

    #[test]
    fn test_summary_is_finished() {
        let summary = WorkflowSummary {
            id: "a".to_string(),
            key: "workflows.a_1_0".to_string(),
            start_timestamp: 1,
            end_timestamp: None,
        };
        assert!(!summary.is_finished());
    }
}
