//! Workflow persistence.
//!
//! [`kv::KeyValueStore`] is the port to the shared store; [`adapter`] holds the
//! aggregate-level contract and the two physical encodings built on it.

pub mod adapter;
pub mod keyed;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod pattern;
pub mod record;
pub mod set;

pub use adapter::{Storage, StorageAdapter};
pub use keyed::KeyedStorage;
pub use keys::{KeySpace, WorkflowKey};
pub use kv::{KeyValueStore, KvOp};
pub use memory::MemoryStore;
pub use set::SetStorage;
