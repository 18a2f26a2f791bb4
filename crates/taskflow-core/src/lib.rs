//! Engine logic for taskflow.
//!
//! Contains the workflow aggregate and trigger rules, the storage key
//! lifecycle protocol over the [`storage::kv::KeyValueStore`] port, the
//! [`queue::JobQueue`] port, and the [`client::Client`] / [`worker::Worker`]
//! pair that drives workflows forward. Store and queue implementations for
//! production live in taskflow-infra; in-memory ones live here.

pub mod client;
pub mod queue;
pub mod storage;
pub mod task;
pub mod worker;
pub mod workflow;

/// Current time as epoch seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
