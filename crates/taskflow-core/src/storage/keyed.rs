//! Composite-key encoding with a lookup index.
//!
//! Each aggregate lives under `{ns}.{id}_{start}_{end}`. Completion renames
//! the key to carry the real end timestamp. Lookups go through a single
//! `{ns}.lookup` hash instead of scanning the keyspace; two scalar markers per
//! workflow let the key be rebuilt when the index entry is missing, and the
//! index is backfilled whenever a slower path finds the key.
//!
//! Nothing is locked. Duplicate completions are absorbed by the
//! already-finished guard and by treating a failed rename as a lost race.

use std::sync::Arc;

use taskflow_types::config::FlowConfig;
use taskflow_types::error::{FlowError, StoreError};
use taskflow_types::task::TaskState;
use taskflow_types::workflow::WorkflowSummary;

use super::adapter::StorageAdapter;
use super::keys::{KeySpace, WorkflowKey};
use super::kv::{KeyValueStore, KvOp};
use super::record;
use crate::now_ts;
use crate::workflow::{RuleRegistry, Workflow};

pub struct KeyedStorage<S> {
    store: Arc<S>,
    keys: KeySpace,
    config: Arc<FlowConfig>,
    rules: Arc<RuleRegistry>,
}

impl<S: KeyValueStore> KeyedStorage<S> {
    pub fn new(store: Arc<S>, config: Arc<FlowConfig>, rules: Arc<RuleRegistry>) -> Self {
        Self {
            store,
            keys: KeySpace::new(config.namespace.clone()),
            config,
            rules,
        }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Resolve the live key of a workflow.
    ///
    /// Order: lookup index, timestamp markers, scan of keys sharing the start
    /// marker, then (opt-in) a scan over every key of the id.
    pub async fn resolve_key(&self, workflow_id: &str) -> Result<Option<String>, FlowError> {
        let index = self.keys.lookup_index();

        if let Some(key) = self.store.hget(&index, workflow_id).await? {
            if self.store.exists(&key).await? {
                return Ok(Some(key));
            }
            tracing::debug!(workflow_id, key = %key, "lookup index entry is stale");
        }

        if let Some(start) = self.read_marker(&self.keys.start_marker(workflow_id)).await? {
            let end = self.read_marker(&self.keys.end_marker(workflow_id)).await?;

            let mut candidates = Vec::with_capacity(2);
            if let Some(end) = end.filter(|e| *e != 0) {
                candidates.push(self.keys.workflow_key(workflow_id, start, end));
            }
            candidates.push(self.keys.workflow_key(workflow_id, start, 0));

            for key in candidates {
                if self.store.exists(&key).await? {
                    self.store.hset(&index, workflow_id, &key).await?;
                    tracing::debug!(workflow_id, key = %key, "lookup index backfilled from markers");
                    return Ok(Some(key));
                }
            }

            // Markers and key can disagree while a completion is in flight.
            let pattern = self.keys.started_at_pattern(workflow_id, start);
            if let Some(found) = self.scan_latest(workflow_id, &pattern).await? {
                let key = self.keys.workflow_key(workflow_id, found.start, found.end);
                self.store.hset(&index, workflow_id, &key).await?;
                tracing::debug!(workflow_id, key = %key, "lookup index backfilled from scan");
                return Ok(Some(key));
            }
        }

        if self.config.legacy_scan_fallback {
            let pattern = self.keys.legacy_pattern(workflow_id);
            if let Some(found) = self.scan_latest(workflow_id, &pattern).await? {
                let key = self.keys.workflow_key(workflow_id, found.start, found.end);
                let mut ops = vec![
                    KvOp::HSet {
                        key: index,
                        field: workflow_id.to_string(),
                        value: key.clone(),
                    },
                    KvOp::Set {
                        key: self.keys.start_marker(workflow_id),
                        value: found.start.to_string(),
                    },
                ];
                if found.is_finished() {
                    ops.push(KvOp::Set {
                        key: self.keys.end_marker(workflow_id),
                        value: found.end.to_string(),
                    });
                }
                self.store.batch(ops).await?;
                tracing::info!(workflow_id, key = %key, "migrated legacy workflow key");
                return Ok(Some(key));
            }
        }

        Ok(None)
    }

    async fn read_marker(&self, key: &str) -> Result<Option<i64>, FlowError> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok()))
    }

    /// Newest aggregate of `workflow_id` among keys matching `pattern`.
    ///
    /// Prefers the latest start; for equal starts an in-progress key wins.
    async fn scan_latest(
        &self,
        workflow_id: &str,
        pattern: &str,
    ) -> Result<Option<WorkflowKey>, FlowError> {
        let found = self
            .store
            .scan(pattern, self.config.scan_count)
            .await?
            .iter()
            .filter_map(|k| self.keys.parse(k))
            .filter(|k| k.id == workflow_id)
            .max_by_key(|k| (k.start, k.end == 0, k.end));
        Ok(found)
    }

    async fn require_key(&self, workflow_id: &str) -> Result<String, FlowError> {
        self.resolve_key(workflow_id)
            .await?
            .ok_or_else(|| FlowError::WorkflowNotFound(workflow_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Completion path
    // -----------------------------------------------------------------------

    /// Mark a workflow finished by renaming its key. Returns true only for
    /// the caller that performed the rename.
    pub async fn succeed_workflow(&self, workflow_id: &str) -> Result<bool, FlowError> {
        let Some(current) = self.resolve_key(workflow_id).await? else {
            tracing::debug!(workflow_id, "workflow key gone before completion");
            return Ok(false);
        };
        let Some(parsed) = self.keys.parse(&current) else {
            return Ok(false);
        };
        if parsed.is_finished() {
            tracing::debug!(workflow_id, key = %current, "workflow already succeeded");
            return Ok(false);
        }

        let end = now_ts().max(1);
        let finished = self.keys.workflow_key(workflow_id, parsed.start, end);
        let ops = vec![
            KvOp::Set {
                key: self.keys.end_marker(workflow_id),
                value: end.to_string(),
            },
            KvOp::Rename {
                from: current.clone(),
                to: finished.clone(),
            },
            KvOp::HSet {
                key: self.keys.lookup_index(),
                field: workflow_id.to_string(),
                value: finished.clone(),
            },
        ];

        match self.store.batch(ops).await {
            Ok(()) => {
                tracing::info!(workflow_id, key = %finished, "workflow succeeded");
                Ok(true)
            }
            Err(StoreError::NoSuchKey(_)) => {
                tracing::debug!(workflow_id, key = %current, "lost completion race");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<S: KeyValueStore> StorageAdapter for KeyedStorage<S> {
    async fn store_workflow(&self, workflow: &mut Workflow, initial: bool) -> Result<(), FlowError> {
        let now = now_ts();
        let id = workflow.id().to_string();

        if initial {
            let key = self.keys.workflow_key(&id, now, 0);
            let meta = workflow.meta_mut();
            meta.start_timestamp = Some(now);
            meta.end_timestamp = None;
            meta.updated_at = Some(now);

            let ops = vec![
                KvOp::HSetMany {
                    key: key.clone(),
                    fields: record::encode_workflow(workflow)?,
                },
                KvOp::Set {
                    key: self.keys.start_marker(&id),
                    value: now.to_string(),
                },
                KvOp::Del {
                    key: self.keys.end_marker(&id),
                },
                KvOp::HSet {
                    key: self.keys.lookup_index(),
                    field: id.clone(),
                    value: key.clone(),
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
        let key = self.require_key(workflow_id).await?;
        let fields = self.store.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(FlowError::WorkflowNotFound(workflow_id.to_string()));
        }

        let mut workflow = record::decode_workflow(fields)?;
        if let Some(parsed) = self.keys.parse(&key) {
            let meta = workflow.meta_mut();
            meta.start_timestamp = Some(parsed.start);
            meta.end_timestamp = parsed.is_finished().then_some(parsed.end);
        }
        Ok(workflow)
    }

    async fn find_workflow_key(&self, workflow_id: &str) -> Result<Option<String>, FlowError> {
        self.resolve_key(workflow_id).await
    }

    async fn already_started(&self, workflow_id: &str) -> Result<bool, FlowError> {
        Ok(self
            .resolve_key(workflow_id)
            .await?
            .and_then(|k| self.keys.parse(&k))
            .is_some_and(|k| !k.is_finished()))
    }

    async fn destroy_workflow(&self, workflow_id: &str) -> Result<bool, FlowError> {
        let Some(key) = self.resolve_key(workflow_id).await? else {
            return Ok(false);
        };
        let ops = vec![
            KvOp::Del { key },
            KvOp::Del {
                key: self.keys.start_marker(workflow_id),
            },
            KvOp::Del {
                key: self.keys.end_marker(workflow_id),
            },
            KvOp::HDel {
                key: self.keys.lookup_index(),
                field: workflow_id.to_string(),
            },
        ];
        self.store.batch(ops).await?;
        tracing::info!(workflow_id, "workflow destroyed");
        Ok(true)
    }

    async fn destroy_succeeded_workflows(&self) -> Result<usize, FlowError> {
        let index = self.keys.lookup_index();
        let finished: Vec<(String, WorkflowKey)> = self
            .store
            .scan(&self.keys.finished_pattern(), self.config.scan_count)
            .await?
            .into_iter()
            .filter_map(|k| self.keys.parse(&k).map(|p| (k, p)))
            .filter(|(_, p)| p.is_finished())
            .collect();

        if finished.is_empty() {
            return Ok(0);
        }

        let mut ops = Vec::with_capacity(finished.len() * 4);
        for (key, parsed) in &finished {
            ops.push(KvOp::Del { key: key.clone() });
            // A restarted workflow keeps its index and markers for the new key.
            let indexed = self.store.hget(&index, &parsed.id).await?;
            if indexed.as_deref() == Some(key.as_str()) {
                ops.push(KvOp::Del {
                    key: self.keys.start_marker(&parsed.id),
                });
                ops.push(KvOp::Del {
                    key: self.keys.end_marker(&parsed.id),
                });
                ops.push(KvOp::HDel {
                    key: index.clone(),
                    field: parsed.id.clone(),
                });
            }
        }
        self.store.batch(ops).await?;

        tracing::info!(count = finished.len(), "destroyed succeeded workflows");
        Ok(finished.len())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, FlowError> {
        let mut summaries: Vec<WorkflowSummary> = self
            .store
            .scan(&self.keys.all_pattern(), self.config.scan_count)
            .await?
            .into_iter()
            .filter_map(|key| {
                self.keys.parse(&key).map(|p| WorkflowSummary {
                    end_timestamp: p.is_finished().then_some(p.end),
                    start_timestamp: p.start,
                    id: p.id,
                    key,
                })
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.start_timestamp
                .cmp(&a.start_timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }
}
