//! Shared harness: in-memory store and queue plus a drain loop that plays the
//! queue's part (redelivery while the retry budget lasts, then exhaustion).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskflow_core::client::Client;
use taskflow_core::queue::{JobQueue, MemoryQueue};
use taskflow_core::storage::{KeyValueStore, MemoryStore, Storage};
use taskflow_core::task::{TaskContext, TaskHandlerRegistry, TaskOutcome, from_fn};
use taskflow_core::worker::{Worker, WorkerError};
use taskflow_core::workflow::RuleRegistry;
use taskflow_types::config::FlowConfig;
use taskflow_types::job::JobPayload;

pub type TestClient = Client<Storage<MemoryStore>, MemoryQueue>;
pub type TestWorker = Worker<Storage<MemoryStore>, MemoryQueue>;

pub struct Harness {
    pub worker: TestWorker,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub performed: usize,
    pub redelivered: usize,
    pub exhausted: Vec<JobPayload>,
}

impl Harness {
    pub fn new(handlers: TaskHandlerRegistry) -> Self {
        Self::with_config(handlers, FlowConfig::default(), RuleRegistry::new())
    }

    pub fn with_config(handlers: TaskHandlerRegistry, config: FlowConfig, rules: RuleRegistry) -> Self {
        let config = Arc::new(config);
        let rules = Arc::new(rules);
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let storage = Storage::new(store.clone(), config.clone(), rules.clone());
        let client = Client::new(storage, queue.clone(), config, rules);
        Self {
            worker: Worker::new(Arc::new(client), handlers),
            store,
            queue,
        }
    }

    pub fn client(&self) -> &TestClient {
        self.worker.client()
    }

    /// Raw store keys matching a glob pattern.
    pub async fn store_keys(&self, pattern: &str) -> Vec<String> {
        self.store.scan(pattern, 100).await.expect("scan")
    }

    /// Deliver jobs until the queue is empty, ignoring their schedule.
    pub async fn drain(&self) -> DrainReport {
        self.drain_at_most(1_000).await
    }

    pub async fn drain_at_most(&self, max_jobs: usize) -> DrainReport {
        let mut report = DrainReport::default();
        let mut attempts: HashMap<JobPayload, u32> = HashMap::new();

        while report.performed < max_jobs {
            let Some(job) = self.queue.pop_next().await else {
                break;
            };
            report.performed += 1;

            match self.worker.perform(&job.payload).await {
                Ok(()) => {}
                Err(WorkerError::Retry { .. }) => {
                    let used = attempts.entry(job.payload.clone()).or_default();
                    if *used < job.retry_budget {
                        *used += 1;
                        report.redelivered += 1;
                        self.queue.enqueue(job).await.expect("redeliver");
                    } else {
                        self.worker
                            .on_retries_exhausted(&job.payload)
                            .await
                            .expect("exhaustion hook");
                        report.exhausted.push(job.payload);
                    }
                }
                Err(e) => panic!("unexpected worker error: {e}"),
            }
        }
        report
    }
}

/// Counts calls and returns a fixed outcome.
pub fn counting(outcome: TaskOutcome) -> (Arc<AtomicUsize>, impl taskflow_core::task::TaskHandler) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = from_fn(move |_: TaskContext| {
        let counter = counter.clone();
        let outcome = outcome.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(outcome)
        }
    });
    (calls, handler)
}

/// Counts calls and fails every time.
pub fn failing(message: &'static str) -> (Arc<AtomicUsize>, impl taskflow_core::task::TaskHandler) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = from_fn(move |_: TaskContext| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!(message))
        }
    });
    (calls, handler)
}

/// Returns `first` for the first `times` calls, then `Succeeded`.
pub fn then_succeed(
    first: TaskOutcome,
    times: usize,
) -> (Arc<AtomicUsize>, impl taskflow_core::task::TaskHandler) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = from_fn(move |_: TaskContext| {
        let counter = counter.clone();
        let first = first.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n < times { first } else { TaskOutcome::Succeeded })
        }
    });
    (calls, handler)
}

/// Fails for the first `times` calls, then succeeds.
pub fn flaky(times: usize) -> (Arc<AtomicUsize>, impl taskflow_core::task::TaskHandler) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = from_fn(move |_: TaskContext| {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < times {
                Err(anyhow::anyhow!("flaky failure {n}"))
            } else {
                Ok(TaskOutcome::Succeeded)
            }
        }
    });
    (calls, handler)
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
