//! Key-value store port.
//!
//! A Redis-shaped contract: string keys, hashes, sets, glob-pattern scans,
//! and pipelined batches. Nothing here is transactional across keys; the
//! storage adapters are written to stay correct without it.
//! Implementations live in this crate (`MemoryStore`) and in taskflow-infra.

use std::collections::HashMap;

use taskflow_types::error::StoreError;

/// One operation inside a [`KeyValueStore::batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Set { key: String, value: String },
    Del { key: String },
    Rename { from: String, to: String },
    HSet { key: String, field: String, value: String },
    HSetMany { key: String, fields: Vec<(String, String)> },
    HDel { key: String, field: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
}

/// Trait for the shared store holding all workflow state.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait KeyValueStore: Send + Sync {
    /// Get a string value. Returns None if the key does not exist.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Set a string value (upsert).
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a key of any type. Returns whether it existed.
    fn del(&self, key: &str) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn exists(&self, key: &str)
    -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Move a key to a new name, replacing whatever the target held.
    ///
    /// Fails with [`StoreError::NoSuchKey`] when `from` does not exist.
    fn rename(
        &self,
        from: &str,
        to: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, StoreError>> + Send;

    fn hset(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn hset_many(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// All fields of a hash; empty when the key does not exist.
    fn hgetall(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<HashMap<String, String>, StoreError>> + Send;

    fn hdel(
        &self,
        key: &str,
        field: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn sadd(
        &self,
        key: &str,
        member: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn srem(
        &self,
        key: &str,
        member: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Move `member` from set `src` to set `dst`.
    ///
    /// Returns false when `member` was not in `src`; exactly one of several
    /// concurrent movers of the same member sees true.
    fn smove(
        &self,
        src: &str,
        dst: &str,
        member: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn sismember(
        &self,
        key: &str,
        member: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn smembers(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Every key matching a glob pattern (`*`, `?`, `[...]`, `[^...]`).
    ///
    /// `count` is a batch-size hint, not a limit.
    fn scan(
        &self,
        pattern: &str,
        count: usize,
    ) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Run operations in order, stopping at the first failure.
    ///
    /// Pipelined, not transactional: operations before the failing one stay applied.
    fn batch(
        &self,
        ops: Vec<KvOp>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        async move {
            for op in ops {
                self.apply(op).await?;
            }
            Ok(())
        }
    }

    /// Apply a single batch operation.
    fn apply(&self, op: KvOp) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        async move {
            match op {
                KvOp::Set { key, value } => self.set(&key, &value).await,
                KvOp::Del { key } => self.del(&key).await.map(|_| ()),
                KvOp::Rename { from, to } => self.rename(&from, &to).await,
                KvOp::HSet { key, field, value } => self.hset(&key, &field, &value).await,
                KvOp::HSetMany { key, fields } => self.hset_many(&key, &fields).await,
                KvOp::HDel { key, field } => self.hdel(&key, &field).await.map(|_| ()),
                KvOp::SAdd { key, member } => self.sadd(&key, &member).await.map(|_| ()),
                KvOp::SRem { key, member } => self.srem(&key, &member).await.map(|_| ()),
            }
        }
    }
}
