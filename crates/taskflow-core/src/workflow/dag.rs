//! The `Workflow` aggregate: a fixed arena of tasks wired into a DAG.
//!
//! Edges are declared only through each task's `children` list. Parent links
//! are derived on construction, which also runs on every rehydration from
//! storage. Construction validates the graph with `petgraph`: task ids must be
//! unique, children must exist, and the graph must be acyclic.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde_json::Value;
use taskflow_types::error::FlowError;
use taskflow_types::task::{TaskState, TaskStatus};
use taskflow_types::workflow::{META_FIELD, SuccessPolicy, WorkflowMeta};

use super::registry::RuleRegistry;

/// A workflow and all of its tasks.
#[derive(Debug, Clone)]
pub struct Workflow {
    meta: WorkflowMeta,
    tasks: Vec<TaskState>,
    index: HashMap<String, usize>,
}

impl Workflow {
    /// Build a new workflow from its id and fixed task list.
    ///
    /// The success policy defaults to `Never`; see [`Workflow::with_success`].
    pub fn new(id: impl Into<String>, tasks: Vec<TaskState>) -> Result<Self, FlowError> {
        Self::from_parts(WorkflowMeta::new(id), tasks)
    }

    /// Rebuild a workflow from persisted metadata and task states.
    ///
    /// Task order follows `tasks`; `meta.tasks` is rewritten to match.
    pub fn from_parts(mut meta: WorkflowMeta, mut tasks: Vec<TaskState>) -> Result<Self, FlowError> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if task.id == META_FIELD {
                return Err(FlowError::InvalidGraph(format!(
                    "task id '{META_FIELD}' is reserved"
                )));
            }
            if index.insert(task.id.clone(), i).is_some() {
                return Err(FlowError::InvalidGraph(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        validate_graph(&tasks, &index)?;
        derive_parents(&mut tasks, &index);

        meta.tasks = tasks.iter().map(|t| t.id.clone()).collect();
        Ok(Self { meta, tasks, index })
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.meta.params = params;
        self
    }

    pub fn with_success(mut self, success: SuccessPolicy) -> Self {
        self.meta.success = success;
        self
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn params(&self) -> &Value {
        &self.meta.params
    }

    pub fn meta(&self) -> &WorkflowMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut WorkflowMeta {
        &mut self.meta
    }

    pub fn tasks(&self) -> &[TaskState] {
        &self.tasks
    }

    /// `(task id, status)` in declaration order.
    pub fn statuses(&self) -> Vec<(&str, TaskStatus)> {
        self.tasks.iter().map(|t| (t.id.as_str(), t.status)).collect()
    }

    pub fn find_task(&self, task_id: &str) -> Option<&TaskState> {
        self.index.get(task_id).map(|&i| &self.tasks[i])
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut TaskState> {
        self.index.get(task_id).map(|&i| &mut self.tasks[i])
    }

    /// Like [`Workflow::find_task`], but a miss is a `TaskNotFound` error.
    pub fn task(&self, task_id: &str) -> Result<&TaskState, FlowError> {
        self.find_task(task_id)
            .ok_or_else(|| self.task_not_found(task_id))
    }

    pub fn task_mut(&mut self, task_id: &str) -> Result<&mut TaskState, FlowError> {
        let err = self.task_not_found(task_id);
        self.find_task_mut(task_id).ok_or(err)
    }

    /// Overwrite one task's persisted state, keeping the derived parent links.
    pub fn replace_task(&mut self, mut task: TaskState) -> Result<(), FlowError> {
        let slot = self.task_mut(&task.id)?;
        task.parents = std::mem::take(&mut slot.parents);
        *slot = task;
        Ok(())
    }

    fn task_not_found(&self, task_id: &str) -> FlowError {
        FlowError::TaskNotFound {
            workflow_id: self.meta.id.clone(),
            task_id: task_id.to_string(),
        }
    }

    /// Current snapshot of a task's parents.
    pub fn parents_of(&self, task_id: &str) -> Vec<&TaskState> {
        self.find_task(task_id)
            .map(|t| t.parents.iter().filter_map(|p| self.find_task(p)).collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Readiness
    // -----------------------------------------------------------------------

    /// Pending, not externally triggered, and its trigger rule is met.
    pub fn ready_to_start(&self, task_id: &str, rules: &RuleRegistry) -> Result<bool, FlowError> {
        let task = self.task(task_id)?;
        if !task.is_pending() || task.is_external_trigger() {
            return Ok(false);
        }
        let rule = rules.build(&task.trigger_rule)?;
        Ok(rule.met(&self.parents_of(task_id)))
    }

    /// Ids of every task that is ready to start, in declaration order.
    pub fn find_ready_to_start_tasks(&self, rules: &RuleRegistry) -> Result<Vec<String>, FlowError> {
        let mut ready = Vec::new();
        for task in &self.tasks {
            if self.ready_to_start(&task.id, rules)? {
                ready.push(task.id.clone());
            }
        }
        Ok(ready)
    }

    /// Check every task's trigger rule and the success policy against `rules`.
    pub fn validate_rules(&self, rules: &RuleRegistry) -> Result<(), FlowError> {
        for task in &self.tasks {
            rules.validate(&task.trigger_rule)?;
        }
        if let SuccessPolicy::Named { name } = &self.meta.success {
            rules.success_check(name)?;
        }
        Ok(())
    }

    /// Evaluate the workflow's success policy.
    pub fn succeeded(&self, rules: &RuleRegistry) -> Result<bool, FlowError> {
        Ok(match &self.meta.success {
            SuccessPolicy::TaskSucceeded { task } => {
                self.find_task(task).is_some_and(|t| t.is_succeeded())
            }
            SuccessPolicy::AllSucceeded => self.tasks.iter().all(|t| t.is_succeeded()),
            SuccessPolicy::Named { name } => {
                let check = rules.success_check(name)?;
                check(self)
            }
            SuccessPolicy::Never => false,
        })
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// Transitive children of `task_id`, each listed once, in discovery order.
    ///
    /// Returns an empty vec for an unknown id.
    pub fn descendants(&self, task_id: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut ordered = Vec::new();
        let mut stack = vec![task_id];

        while let Some(current) = stack.pop() {
            let Some(task) = self.find_task(current) else {
                continue;
            };
            for child in task.children.iter().rev() {
                if visited.insert(child.as_str()) {
                    ordered.push(child.clone());
                    stack.push(child.as_str());
                }
            }
        }

        ordered
    }

    /// Reset `task_id` and all of its descendants to pending.
    ///
    /// Returns the ids that were reset, the root first.
    pub fn clear_branch(&mut self, task_id: &str) -> Result<Vec<String>, FlowError> {
        self.task(task_id)?;
        let mut cleared = vec![task_id.to_string()];
        cleared.extend(self.descendants(task_id));

        for id in &cleared {
            if let Some(task) = self.find_task_mut(id) {
                task.reset_for_restart();
            }
        }
        Ok(cleared)
    }
}

/// Reject unknown children and cycles.
fn validate_graph(tasks: &[TaskState], index: &HashMap<String, usize>) -> Result<(), FlowError> {
    // Edge from parent -> child
    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: Vec<_> = tasks.iter().map(|t| graph.add_node(t.id.as_str())).collect();

    for (from, task) in tasks.iter().enumerate() {
        for child in &task.children {
            let to = index.get(child).ok_or_else(|| {
                FlowError::InvalidGraph(format!(
                    "task '{}' lists unknown child '{}'",
                    task.id, child
                ))
            })?;
            graph.add_edge(nodes[from], nodes[*to], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        FlowError::InvalidGraph(format!("cycle detected involving task '{node_id}'"))
    })?;

    Ok(())
}

/// Recompute every task's `parents` from the global `children` edges.
fn derive_parents(tasks: &mut [TaskState], index: &HashMap<String, usize>) {
    for task in tasks.iter_mut() {
        task.parents.clear();
    }

    let edges: Vec<(usize, String)> = tasks
        .iter()
        .flat_map(|t| {
            t.children
                .iter()
                .filter_map(|c| index.get(c).map(|&i| (i, t.id.clone())))
        })
        .collect();

    for (child, parent) in edges {
        let parents = &mut tasks[child].parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
