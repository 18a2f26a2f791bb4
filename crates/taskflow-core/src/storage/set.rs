//! Stable-key encoding tracked by two index sets.
//!
//! The aggregate keeps one key for its whole life; in-progress and finished
//! workflows are told apart by membership in `{ns}.set.in-progress` and
//! `{ns}.set.finished`. Completion moves the key between the sets, and the
//! set move picks the single winner among concurrent finishers.

use std::sync::Arc;

use taskflow_types::config::FlowConfig;
use taskflow_types::error::FlowError;
use taskflow_types::task::TaskState;
use taskflow_types::workflow::{META_FIELD, WorkflowMeta, WorkflowSummary};

use super::adapter::StorageAdapter;
use super::keys::KeySpace;
use super::kv::{KeyValueStore, KvOp};
use super::record;
use crate::now_ts;
use crate::workflow::{RuleRegistry, Workflow};

pub struct SetStorage<S> {
    store: Arc<S>,
    keys: KeySpace,
    rules: Arc<RuleRegistry>,
}

impl<S: KeyValueStore> SetStorage<S> {
    pub fn new(store: Arc<S>, config: Arc<FlowConfig>, rules: Arc<RuleRegistry>) -> Self {
        Self {
            store,
            keys: KeySpace::new(config.namespace.clone()),
            rules,
        }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    async fn require_key(&self, workflow_id: &str) -> Result<String, FlowError> {
        let key = self.keys.set_key(workflow_id);
        if self.store.exists(&key).await? {
            Ok(key)
        } else {
            Err(FlowError::WorkflowNotFound(workflow_id.to_string()))
        }
    }

    async fn read_meta(&self, key: &str) -> Result<Option<WorkflowMeta>, FlowError> {
        match self.store.hget(key, META_FIELD).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Move the workflow to the finished set. Returns true only for the
    /// caller whose move succeeded.
    pub async fn succeed_workflow(&self, workflow_id: &str) -> Result<bool, FlowError> {
        let key = self.keys.set_key(workflow_id);
        let finished = self.keys.finished_set();

        if self.store.sismember(&finished, &key).await? {
            tracing::debug!(workflow_id, "workflow already succeeded");
            return Ok(false);
        }
        if !self
            .store
            .smove(&self.keys.in_progress_set(), &finished, &key)
            .await?
        {
            tracing::debug!(workflow_id, "lost completion race");
            return Ok(false);
        }

        let Some(mut meta) = self.read_meta(&key).await? else {
            return Ok(false);
        };
        let now = now_ts();
        meta.end_timestamp = Some(now);
        meta.updated_at = Some(now);
        meta.current_set = Some(finished);
        self.store
            .hset(&key, META_FIELD, &record::encode_meta(&meta)?)
            .await?;

        tracing::info!(workflow_id, key = %key, "workflow succeeded");
        Ok(true)
    }
}

impl<S: KeyValueStore> StorageAdapter for SetStorage<S> {
    async fn store_workflow(&self, workflow: &mut Workflow, initial: bool) -> Result<(), FlowError> {
        let now = now_ts();
        let id = workflow.id().to_string();

        if initial {
            let key = self.keys.set_key(&id);
            let in_progress = self.keys.in_progress_set();
            let meta = workflow.meta_mut();
            meta.start_timestamp = Some(now);
            meta.end_timestamp = None;
            meta.updated_at = Some(now);
            meta.current_set = Some(in_progress.clone());

            let ops = vec![
                KvOp::SAdd {
                    key: in_progress,
                    member: key.clone(),
                },
                KvOp::SRem {
                    key: self.keys.finished_set(),
                    member: key.clone(),
                },
                KvOp::HSetMany {
                    key: key.clone(),
                    fields: record::encode_workflow(workflow)?,
                },
            ];
            self.store.batch(ops).await?;
            tracing::debug!(workflow_id = %id, key = %key, "workflow stored");
            return Ok(());
        }

        let key = self.require_key(&id).await?;
        workflow.meta_mut().updated_at = Some(now);
        self.store
            .hset_many(&key, &record::encode_workflow(workflow)?)
            .await?;
        Ok(())
    }

    async fn store_task(&self, workflow_id: &str, task: &TaskState) -> Result<(), FlowError> {
        let key = self.require_key(workflow_id).await?;
        self.store
            .hset(&key, &task.id, &record::encode_task(task)?)
            .await?;

        if self.find_workflow(workflow_id).await?.succeeded(&self.rules)? {
            self.succeed_workflow(workflow_id).await?;
        }
        Ok(())
    }

    async fn find_workflow(&self, workflow_id: &str) -> Result<Workflow, FlowError> {
        let key = self.keys.set_key(workflow_id);
        let fields = self.store.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(FlowError::WorkflowNotFound(workflow_id.to_string()));
        }
        record::decode_workflow(fields)
    }

    async fn find_workflow_key(&self, workflow_id: &str) -> Result<Option<String>, FlowError> {
        let key = self.keys.set_key(workflow_id);
        Ok(self.store.exists(&key).await?.then_some(key))
    }

    async fn already_started(&self, workflow_id: &str) -> Result<bool, FlowError> {
        Ok(self
            .store
            .sismember(&self.keys.in_progress_set(), &self.keys.set_key(workflow_id))
            .await?)
    }

    async fn destroy_workflow(&self, workflow_id: &str) -> Result<bool, FlowError> {
        let key = self.keys.set_key(workflow_id);
        if !self.store.exists(&key).await? {
            return Ok(false);
        }
        let ops = vec![
            KvOp::Del { key: key.clone() },
            KvOp::SRem {
                key: self.keys.in_progress_set(),
                member: key.clone(),
            },
            KvOp::SRem {
                key: self.keys.finished_set(),
                member: key,
            },
        ];
        self.store.batch(ops).await?;
        tracing::info!(workflow_id, "workflow destroyed");
        Ok(true)
    }

    async fn destroy_succeeded_workflows(&self) -> Result<usize, FlowError> {
        let finished_set = self.keys.finished_set();
        let members = self.store.smembers(&finished_set).await?;
        if members.is_empty() {
            return Ok(0);
        }

        let mut ops = Vec::with_capacity(members.len() * 2);
        for key in &members {
            ops.push(KvOp::Del { key: key.clone() });
            ops.push(KvOp::SRem {
                key: finished_set.clone(),
                member: key.clone(),
            });
        }
        self.store.batch(ops).await?;

        tracing::info!(count = members.len(), "destroyed succeeded workflows");
        Ok(members.len())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, FlowError> {
        let mut keys = self.store.smembers(&self.keys.in_progress_set()).await?;
        keys.extend(self.store.smembers(&self.keys.finished_set()).await?);

        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(meta) = self.read_meta(&key).await? else {
                continue;
            };
            summaries.push(WorkflowSummary {
                id: meta.id,
                key,
                start_timestamp: meta.start_timestamp.unwrap_or_default(),
                end_timestamp: meta.end_timestamp,
            });
        }
        summaries.sort_by(|a, b| {
            b.start_timestamp
                .cmp(&a.start_timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use taskflow_types::config::StorageEncoding;
    use taskflow_types::task::TaskStatus;
    use taskflow_types::workflow::SuccessPolicy;

    fn storage() -> (Arc<MemoryStore>, SetStorage<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = FlowConfig {
            storage: StorageEncoding::Set,
            ..FlowConfig::default()
        };
        let storage = SetStorage::new(store.clone(), Arc::new(config), Arc::new(RuleRegistry::new()));
        (store, storage)
    }

    fn workflow(id: &str) -> Workflow {
        Workflow::new(id, vec![TaskState::new("only")])
            .unwrap()
            .with_success(SuccessPolicy::AllSucceeded)
    }

    #[tokio::test]
    async fn test_initial_store_adds_to_in_progress() {
        let (store, storage) = storage();
        let mut wf = workflow("wf-1");
        storage.store_workflow(&mut wf, true).await.unwrap();

        assert!(storage.already_started("wf-1").await.unwrap());
        assert!(
            store
                .sismember("workflows.set.in-progress", "workflows.set.wf-1")
                .await
                .unwrap()
        );
        assert_eq!(
            storage.find_workflow_key("wf-1").await.unwrap(),
            Some("workflows.set.wf-1".to_string())
        );
        let found = storage.find_workflow("wf-1").await.unwrap();
        assert_eq!(
            found.meta().current_set.as_deref(),
            Some("workflows.set.in-progress")
        );
    }

    #[tokio::test]
    async fn test_completion_moves_between_sets() {
        let (store, storage) = storage();
        let mut wf = workflow("wf-1");
        storage.store_workflow(&mut wf, true).await.unwrap();

        let mut task = TaskState::new("only");
        task.status = TaskStatus::Succeeded;
        storage.store_task("wf-1", &task).await.unwrap();

        assert!(!storage.already_started("wf-1").await.unwrap());
        assert!(
            store
                .sismember("workflows.set.finished", "workflows.set.wf-1")
                .await
                .unwrap()
        );
        let found = storage.find_workflow("wf-1").await.unwrap();
        assert!(found.meta().end_timestamp.is_some());
        assert_eq!(
            found.meta().current_set.as_deref(),
            Some("workflows.set.finished")
        );
        assert!(!storage.succeed_workflow("wf-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_completion_single_winner() {
        let (_store, storage) = storage();
        let storage = Arc::new(storage);
        let mut wf = workflow("wf-1");
        storage.store_workflow(&mut wf, true).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.succeed_workflow("wf-1").await.unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_store_task_requires_workflow() {
        let (_store, storage) = storage();
        assert!(matches!(
            storage.store_task("ghost", &TaskState::new("only")).await,
            Err(FlowError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_and_prune() {
        let (store, storage) = storage();
        let mut done = workflow("done");
        let mut running = workflow("running");
        storage.store_workflow(&mut done, true).await.unwrap();
        storage.store_workflow(&mut running, true).await.unwrap();
        storage.succeed_workflow("done").await.unwrap();

        let list = storage.list_workflows().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().find(|s| s.id == "done").unwrap().is_finished());

        assert_eq!(storage.destroy_succeeded_workflows().await.unwrap(), 1);
        assert!(storage.find_workflow("done").await.is_err());
        assert!(!store.exists("workflows.set.finished").await.unwrap());

        assert!(storage.destroy_workflow("running").await.unwrap());
        assert!(!storage.destroy_workflow("running").await.unwrap());
        assert!(store.is_empty());
    }
}
