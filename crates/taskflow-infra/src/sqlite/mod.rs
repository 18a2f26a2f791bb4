//! SQLite storage layer.
//!
//! Key-value store and job queue backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod kv;
pub mod pool;
pub mod queue;

use taskflow_types::error::{QueueError, StoreError};

pub(crate) fn store_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub(crate) fn queue_err(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}
