//! Aggregate record codec.
//!
//! A workflow is stored as one hash: the reserved `__workflow__` field holds
//! the JSON metadata, every other field is a task id holding that task's JSON.

use std::collections::HashMap;

use taskflow_types::error::FlowError;
use taskflow_types::task::TaskState;
use taskflow_types::workflow::{META_FIELD, WorkflowMeta};

use crate::workflow::Workflow;

/// Hash fields for the whole aggregate.
pub fn encode_workflow(workflow: &Workflow) -> Result<Vec<(String, String)>, FlowError> {
    let mut fields = Vec::with_capacity(workflow.tasks().len() + 1);
    fields.push((META_FIELD.to_string(), encode_meta(workflow.meta())?));
    for task in workflow.tasks() {
        fields.push((task.id.clone(), encode_task(task)?));
    }
    Ok(fields)
}

pub fn encode_meta(meta: &WorkflowMeta) -> Result<String, FlowError> {
    Ok(serde_json::to_string(meta)?)
}

pub fn encode_task(task: &TaskState) -> Result<String, FlowError> {
    Ok(serde_json::to_string(task)?)
}

/// Rebuild a workflow from its hash fields, re-deriving parent links.
///
/// Tasks follow the order recorded in the metadata; fields the metadata does
/// not list are appended in id order.
pub fn decode_workflow(mut fields: HashMap<String, String>) -> Result<Workflow, FlowError> {
    let meta_json = fields
        .remove(META_FIELD)
        .ok_or_else(|| FlowError::Serialization("aggregate has no workflow metadata".to_string()))?;
    let meta: WorkflowMeta = serde_json::from_str(&meta_json)?;

    let mut tasks = Vec::with_capacity(fields.len());
    for id in &meta.tasks {
        if let Some(json) = fields.remove(id) {
            tasks.push(decode_task(id, &json)?);
        }
    }

    let mut rest: Vec<_> = fields.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, json) in rest {
        tasks.push(decode_task(&id, &json)?);
    }

    Workflow::from_parts(meta, tasks)
}

/// Decode one task; the hash field name is authoritative for its id.
pub fn decode_task(id: &str, json: &str) -> Result<TaskState, FlowError> {
    let mut task: TaskState = serde_json::from_str(json)?;
    task.id = id.to_string();
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_types::task::TaskStatus;
    use taskflow_types::workflow::SuccessPolicy;

    fn sample() -> Workflow {
        Workflow::new(
            "wf",
            vec![
                TaskState::new("b").with_children(["a"]),
                TaskState::new("a"),
            ],
        )
        .unwrap()
        .with_success(SuccessPolicy::TaskSucceeded {
            task: "a".to_string(),
        })
    }

    #[test]
    fn test_decode_restores_order_and_parents() {
        let fields: HashMap<_, _> = encode_workflow(&sample()).unwrap().into_iter().collect();
        let wf = decode_workflow(fields).unwrap();
        let ids: Vec<_> = wf.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(wf.find_task("a").unwrap().parents, vec!["b"]);
        assert_eq!(
            wf.meta().success,
            SuccessPolicy::TaskSucceeded {
                task: "a".to_string()
            }
        );
    }

    #[test]
    fn test_decode_picks_up_task_field_updates() {
        let mut fields: HashMap<_, _> = encode_workflow(&sample()).unwrap().into_iter().collect();
        let mut a = TaskState::new("a");
        a.status = TaskStatus::Succeeded;
        fields.insert("a".to_string(), encode_task(&a).unwrap());

        let wf = decode_workflow(fields).unwrap();
        assert!(wf.find_task("a").unwrap().is_succeeded());
    }

    #[test]
    fn test_decode_without_meta_fails() {
        let mut fields = HashMap::new();
        fields.insert("a".to_string(), encode_task(&TaskState::new("a")).unwrap());
        assert!(matches!(
            decode_workflow(fields),
            Err(FlowError::Serialization(_))
        ));
    }
}
