//! Job queue port.
//!
//! The engine only ever pushes; delivery, redelivery, and retry budgets are
//! the queue's business. A delivered job is handed to
//! [`crate::worker::Worker::perform`].

pub mod memory;

pub use memory::MemoryQueue;

use taskflow_types::error::QueueError;
use taskflow_types::job::JobRequest;

/// Trait for the job queue that schedules task executions.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait JobQueue: Send + Sync {
    /// Schedule a job to run no earlier than `request.scheduled_at`.
    fn enqueue(
        &self,
        request: JobRequest,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;
}
