//! Persistence contract for workflow aggregates, and the encoding switch.

use std::sync::Arc;

use taskflow_types::config::{FlowConfig, StorageEncoding};
use taskflow_types::error::FlowError;
use taskflow_types::task::TaskState;
use taskflow_types::workflow::WorkflowSummary;

use super::keyed::KeyedStorage;
use super::kv::KeyValueStore;
use super::set::SetStorage;
use crate::workflow::{RuleRegistry, Workflow};

/// Stores and finalizes workflow aggregates.
///
/// `store_task` is the completion trigger: after writing the task it
/// re-evaluates the workflow's success policy and, when it holds, marks the
/// aggregate finished. Finalization is idempotent under concurrent callers.
pub trait StorageAdapter: Send + Sync {
    /// Persist the whole aggregate. `initial` creates a fresh in-progress record.
    fn store_workflow(
        &self,
        workflow: &mut Workflow,
        initial: bool,
    ) -> impl std::future::Future<Output = Result<(), FlowError>> + Send;

    /// Persist one task and run the completion check.
    fn store_task(
        &self,
        workflow_id: &str,
        task: &TaskState,
    ) -> impl std::future::Future<Output = Result<(), FlowError>> + Send;

    /// Load an aggregate. Fails with `WorkflowNotFound` when no live record exists.
    fn find_workflow(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Workflow, FlowError>> + Send;

    /// Current storage key of a workflow, if any.
    fn find_workflow_key(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, FlowError>> + Send;

    /// Whether an in-progress record exists for this id.
    fn already_started(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, FlowError>> + Send;

    /// Remove a workflow and its index entries. Returns false if nothing was found.
    fn destroy_workflow(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, FlowError>> + Send;

    /// Remove every finished workflow. Returns how many were removed.
    fn destroy_succeeded_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<usize, FlowError>> + Send;

    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowSummary>, FlowError>> + Send;
}

/// The adapter selected by [`FlowConfig::storage`].
pub enum Storage<S: KeyValueStore> {
    Keyed(KeyedStorage<S>),
    Set(SetStorage<S>),
}

impl<S: KeyValueStore> Storage<S> {
    pub fn new(store: Arc<S>, config: Arc<FlowConfig>, rules: Arc<RuleRegistry>) -> Self {
        match config.storage {
            StorageEncoding::Keyed => Storage::Keyed(KeyedStorage::new(store, config, rules)),
            StorageEncoding::Set => Storage::Set(SetStorage::new(store, config, rules)),
        }
    }

    pub fn encoding(&self) -> StorageEncoding {
        match self {
            Storage::Keyed(_) => StorageEncoding::Keyed,
            Storage::Set(_) => StorageEncoding::Set,
        }
    }
}

impl<S: KeyValueStore> StorageAdapter for Storage<S> {
    async fn store_workflow(&self, workflow: &mut Workflow, initial: bool) -> Result<(), FlowError> {
        match self {
            Storage::Keyed(s) => s.store_workflow(workflow, initial).await,
            Storage::Set(s) => s.store_workflow(workflow, initial).await,
        }
    }

    async fn store_task(&self, workflow_id: &str, task: &TaskState) -> Result<(), FlowError> {
        match self {
            Storage::Keyed(s) => s.store_task(workflow_id, task).await,
            Storage::Set(s) => s.store_task(workflow_id, task).await,
        }
    }

    async fn find_workflow(&self, workflow_id: &str) -> Result<Workflow, FlowError> {
        match self {
            Storage::Keyed(s) => s.find_workflow(workflow_id).await,
            Storage::Set(s) => s.find_workflow(workflow_id).await,
        }
    }

    async fn find_workflow_key(&self, workflow_id: &str) -> Result<Option<String>, FlowError> {
        match self {
            Storage::Keyed(s) => s.find_workflow_key(workflow_id).await,
            Storage::Set(s) => s.find_workflow_key(workflow_id).await,
        }
    }

    async fn already_started(&self, workflow_id: &str) -> Result<bool, FlowError> {
        match self {
            Storage::Keyed(s) => s.already_started(workflow_id).await,
            Storage::Set(s) => s.already_started(workflow_id).await,
        }
    }

    async fn destroy_workflow(&self, workflow_id: &str) -> Result<bool, FlowError> {
        match self {
            Storage::Keyed(s) => s.destroy_workflow(workflow_id).await,
            Storage::Set(s) => s.destroy_workflow(workflow_id).await,
        }
    }

    async fn destroy_succeeded_workflows(&self) -> Result<usize, FlowError> {
        match self {
            Storage::Keyed(s) => s.destroy_succeeded_workflows().await,
            Storage::Set(s) => s.destroy_succeeded_workflows().await,
        }
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, FlowError> {
        match self {
            Storage::Keyed(s) => s.list_workflows().await,
            Storage::Set(s) => s.list_workflows().await,
        }
    }
}
