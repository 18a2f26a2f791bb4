//! In-process key-value store backed by `DashMap`.
//!
//! Follows Redis semantics where the adapters depend on them: hashes and
//! sets disappear when their last field or member is removed, `rename`
//! fails on a missing source, and `smove` hands a member to exactly one
//! caller. Guards are never held across `.await`.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use taskflow_types::error::StoreError;

use super::kv::KeyValueStore;
use super::pattern;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

/// Concurrent in-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType(key.to_string())
    }

    fn hash_write<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, String>) -> R,
    ) -> Result<R, StoreError> {
        let mut entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry.value_mut() {
            Value::Hash(h) => Ok(f(h)),
            _ => Err(Self::wrong_type(key)),
        }
    }

    fn set_write<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashSet<String>) -> R,
    ) -> Result<R, StoreError> {
        let mut entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()));
        match entry.value_mut() {
            Value::Set(s) => Ok(f(s)),
            _ => Err(Self::wrong_type(key)),
        }
    }

    /// Drop `key` if it is an empty hash or set.
    fn prune(&self, key: &str) {
        self.inner.remove_if(key, |_, v| match v {
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Str(_) => false,
        });
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.inner.get(key).map(|r| r.value().clone()) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(), Value::Str(value.to_string()));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.contains_key(key))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let (_, value) = self
            .inner
            .remove(from)
            .ok_or_else(|| StoreError::NoSuchKey(from.to_string()))?;
        self.inner.insert(to.to_string(), value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(r) => match r.value() {
                Value::Hash(h) => Ok(h.get(field).cloned()),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hash_write(key, |h| {
            h.insert(field.to_string(), value.to_string());
        })
    }

    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.hash_write(key, |h| {
            for (f, v) in fields {
                h.insert(f.clone(), v.clone());
            }
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        match self.inner.get(key) {
            None => Ok(HashMap::new()),
            Some(r) => match r.value() {
                Value::Hash(h) => Ok(h.clone()),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let removed = match self.inner.get_mut(key) {
            None => return Ok(false),
            Some(mut r) => match r.value_mut() {
                Value::Hash(h) => h.remove(field).is_some(),
                _ => return Err(Self::wrong_type(key)),
            },
        };
        self.prune(key);
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.set_write(key, |s| s.insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed = match self.inner.get_mut(key) {
            None => return Ok(false),
            Some(mut r) => match r.value_mut() {
                Value::Set(s) => s.remove(member),
                _ => return Err(Self::wrong_type(key)),
            },
        };
        self.prune(key);
        Ok(removed)
    }

    async fn smove(&self, src: &str, dst: &str, member: &str) -> Result<bool, StoreError> {
        if let Some(r) = self.inner.get(dst) {
            if !matches!(r.value(), Value::Set(_)) {
                return Err(Self::wrong_type(dst));
            }
        }
        // Removing under the shard lock decides the single winner.
        if !self.srem(src, member).await? {
            return Ok(false);
        }
        self.sadd(dst, member).await?;
        Ok(true)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.inner.get(key) {
            None => Ok(false),
            Some(r) => match r.value() {
                Value::Set(s) => Ok(s.contains(member)),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.inner.get(key) {
            None => Ok(Vec::new()),
            Some(r) => match r.value() {
                Value::Set(s) => {
                    let mut members: Vec<String> = s.iter().cloned().collect();
                    members.sort();
                    Ok(members)
                }
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn scan(&self, pattern: &str, _count: usize) -> Result<Vec<String>, StoreError> {
        let pattern = pattern::compile(pattern)?;
        let mut keys: Vec<String> = self
            .inner
            .iter()
            .filter(|r| pattern.matches(r.key()))
            .map(|r| r.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
