//! SQLite key-value store implementation.
//!
//! Implements `KeyValueStore` from `taskflow-core` with one table per value
//! kind (`kv_strings`, `kv_hashes`, `kv_sets`). Writes run in a transaction on
//! the single writer connection; a batch is one transaction, so a failing
//! operation rolls back the whole batch. Scans push the glob down to `GLOB`.

use std::collections::HashMap;

use sqlx::{Row, SqliteConnection};
use taskflow_core::storage::{KeyValueStore, KvOp};
use taskflow_types::error::StoreError;

use super::pool::DatabasePool;
use super::store_err;

/// SQLite-backed implementation of `KeyValueStore`.
pub struct SqliteKvStore {
    pool: DatabasePool,
}

impl SqliteKvStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Statement helpers (run on a writer transaction)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Hash,
    Set,
}

async fn kind_of(conn: &mut SqliteConnection, key: &str) -> Result<Option<Kind>, StoreError> {
    let row = sqlx::query(
        "SELECT 'string' AS kind FROM kv_strings WHERE key = ?
         UNION ALL SELECT 'hash' FROM kv_hashes WHERE key = ?
         UNION ALL SELECT 'set' FROM kv_sets WHERE key = ?
         LIMIT 1",
    )
    .bind(key)
    .bind(key)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let kind: String = row.try_get("kind").map_err(store_err)?;
    Ok(Some(match kind.as_str() {
        "string" => Kind::Str,
        "hash" => Kind::Hash,
        _ => Kind::Set,
    }))
}

async fn expect_kind(conn: &mut SqliteConnection, key: &str, want: Kind) -> Result<(), StoreError> {
    match kind_of(conn, key).await? {
        Some(kind) if kind != want => Err(StoreError::WrongType(key.to_string())),
        _ => Ok(()),
    }
}

async fn delete_key(conn: &mut SqliteConnection, key: &str) -> Result<bool, StoreError> {
    let mut removed = 0;
    for sql in [
        "DELETE FROM kv_strings WHERE key = ?",
        "DELETE FROM kv_hashes WHERE key = ?",
        "DELETE FROM kv_sets WHERE key = ?",
    ] {
        removed += sqlx::query(sql)
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(store_err)?
            .rows_affected();
    }
    Ok(removed > 0)
}

async fn set_in(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM kv_hashes WHERE key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    sqlx::query("DELETE FROM kv_sets WHERE key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    sqlx::query(
        "INSERT INTO kv_strings (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await
    .map_err(store_err)?;
    Ok(())
}

async fn rename_in(conn: &mut SqliteConnection, from: &str, to: &str) -> Result<(), StoreError> {
    if kind_of(conn, from).await?.is_none() {
        return Err(StoreError::NoSuchKey(from.to_string()));
    }
    if from == to {
        return Ok(());
    }
    delete_key(conn, to).await?;
    for sql in [
        "UPDATE kv_strings SET key = ? WHERE key = ?",
        "UPDATE kv_hashes SET key = ? WHERE key = ?",
        "UPDATE kv_sets SET key = ? WHERE key = ?",
    ] {
        sqlx::query(sql)
            .bind(to)
            .bind(from)
            .execute(&mut *conn)
            .await
            .map_err(store_err)?;
    }
    Ok(())
}

async fn hset_in(
    conn: &mut SqliteConnection,
    key: &str,
    fields: &[(String, String)],
) -> Result<(), StoreError> {
    expect_kind(conn, key, Kind::Hash).await?;
    for (field, value) in fields {
        sqlx::query(
            "INSERT INTO kv_hashes (key, field, value) VALUES (?, ?, ?)
             ON CONFLICT (key, field) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    }
    Ok(())
}

async fn hdel_in(conn: &mut SqliteConnection, key: &str, field: &str) -> Result<bool, StoreError> {
    expect_kind(conn, key, Kind::Hash).await?;
    let result = sqlx::query("DELETE FROM kv_hashes WHERE key = ? AND field = ?")
        .bind(key)
        .bind(field)
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    Ok(result.rows_affected() > 0)
}

async fn sadd_in(conn: &mut SqliteConnection, key: &str, member: &str) -> Result<bool, StoreError> {
    expect_kind(conn, key, Kind::Set).await?;
    let result = sqlx::query("INSERT OR IGNORE INTO kv_sets (key, member) VALUES (?, ?)")
        .bind(key)
        .bind(member)
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    Ok(result.rows_affected() > 0)
}

async fn srem_in(conn: &mut SqliteConnection, key: &str, member: &str) -> Result<bool, StoreError> {
    expect_kind(conn, key, Kind::Set).await?;
    let result = sqlx::query("DELETE FROM kv_sets WHERE key = ? AND member = ?")
        .bind(key)
        .bind(member)
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    Ok(result.rows_affected() > 0)
}

async fn apply_in(conn: &mut SqliteConnection, op: KvOp) -> Result<(), StoreError> {
    match op {
        KvOp::Set { key, value } => set_in(conn, &key, &value).await,
        KvOp::Del { key } => delete_key(conn, &key).await.map(|_| ()),
        KvOp::Rename { from, to } => rename_in(conn, &from, &to).await,
        KvOp::HSet { key, field, value } => hset_in(conn, &key, &[(field, value)]).await,
        KvOp::HSetMany { key, fields } => hset_in(conn, &key, &fields).await,
        KvOp::HDel { key, field } => hdel_in(conn, &key, &field).await.map(|_| ()),
        KvOp::SAdd { key, member } => sadd_in(conn, &key, &member).await.map(|_| ()),
        KvOp::SRem { key, member } => srem_in(conn, &key, &member).await.map(|_| ()),
    }
}

// ---------------------------------------------------------------------------
// KeyValueStore implementation
// ---------------------------------------------------------------------------

impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.reader.acquire().await.map_err(store_err)?;
        let row = sqlx::query("SELECT value FROM kv_strings WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => Ok(Some(row.try_get("value").map_err(store_err)?)),
            None => match kind_of(&mut conn, key).await? {
                Some(_) => Err(StoreError::WrongType(key.to_string())),
                None => Ok(None),
            },
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        set_in(&mut tx, key, value).await?;
        tx.commit().await.map_err(store_err)
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        let removed = delete_key(&mut tx, key).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.reader.acquire().await.map_err(store_err)?;
        Ok(kind_of(&mut conn, key).await?.is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        rename_in(&mut tx, from, to).await?;
        tx.commit().await.map_err(store_err)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv_hashes WHERE key = ? AND field = ?")
            .bind(key)
            .bind(field)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(store_err)?;
        row.map(|r| r.try_get("value").map_err(store_err)).transpose()
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let fields = [(field.to_string(), value.to_string())];
        self.hset_many(key, &fields).await
    }

    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        hset_in(&mut tx, key, fields).await?;
        tx.commit().await.map_err(store_err)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let rows = sqlx::query("SELECT field, value FROM kv_hashes WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(store_err)?;

        let mut fields = HashMap::with_capacity(rows.len());
        for row in rows {
            fields.insert(
                row.try_get("field").map_err(store_err)?,
                row.try_get("value").map_err(store_err)?,
            );
        }
        Ok(fields)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        let removed = hdel_in(&mut tx, key, field).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        let added = sadd_in(&mut tx, key, member).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(added)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        let removed = srem_in(&mut tx, key, member).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(removed)
    }

    async fn smove(&self, src: &str, dst: &str, member: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        expect_kind(&mut tx, dst, Kind::Set).await?;
        if !srem_in(&mut tx, src, member).await? {
            return Ok(false);
        }
        sadd_in(&mut tx, dst, member).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(true)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM kv_sets WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(store_err)?;
        Ok(row.is_some())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT member FROM kv_sets WHERE key = ? ORDER BY member")
            .bind(key)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(store_err)?;
        rows.iter()
            .map(|r| r.try_get("member").map_err(store_err))
            .collect()
    }

    async fn scan(&self, pattern: &str, _count: usize) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT key FROM kv_strings WHERE key GLOB ?
             UNION SELECT key FROM kv_hashes WHERE key GLOB ?
             UNION SELECT key FROM kv_sets WHERE key GLOB ?
             ORDER BY key",
        )
        .bind(pattern)
        .bind(pattern)
        .bind(pattern)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(store_err)?;
        rows.iter()
            .map(|r| r.try_get("key").map_err(store_err))
            .collect()
    }

    async fn batch(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_err)?;
        for op in ops {
            apply_in(&mut tx, op).await?;
        }
        tx.commit().await.map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use taskflow_core::storage::{KeyedStorage, StorageAdapter};
    use taskflow_core::workflow::{RuleRegistry, Workflow};
    use taskflow_types::config::FlowConfig;
    use taskflow_types::task::TaskState;
    use taskflow_types::workflow::SuccessPolicy;

    async fn store() -> (tempfile::TempDir, SqliteKvStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("kv.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteKvStore::new(pool))
    }

    #[tokio::test]
    async fn test_strings_and_types() {
        let (_dir, store) = store().await;
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert!(matches!(
            store.hset("a", "f", "v").await,
            Err(StoreError::WrongType(_))
        ));

        store.hset("h", "f", "v").await.unwrap();
        assert!(matches!(store.get("h").await, Err(StoreError::WrongType(_))));
        assert!(store.exists("h").await.unwrap());
        assert!(store.del("h").await.unwrap());
        assert!(!store.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes() {
        let (_dir, store) = store().await;
        store
            .hset_many(
                "h",
                &[
                    ("a".to_string(), "1".to_string()),
                    ("b".to_string(), "2".to_string()),
                ],
            )
            .await
            .unwrap();
        store.hset("h", "a", "3").await.unwrap();

        let all = store.hgetall("h").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], "3");
        assert!(store.hdel("h", "a").await.unwrap());
        assert!(!store.hdel("h", "a").await.unwrap());
        assert_eq!(store.hget("h", "b").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_rename_moves_hash() {
        let (_dir, store) = store().await;
        store.hset("old", "f", "v").await.unwrap();
        store.rename("old", "new").await.unwrap();
        assert!(!store.exists("old").await.unwrap());
        assert_eq!(store.hget("new", "f").await.unwrap(), Some("v".to_string()));
        assert!(matches!(
            store.rename("old", "other").await,
            Err(StoreError::NoSuchKey(_))
        ));
    }

    #[tokio::test]
    async fn test_sets_and_smove() {
        let (_dir, store) = store().await;
        assert!(store.sadd("src", "m").await.unwrap());
        assert!(!store.sadd("src", "m").await.unwrap());
        assert!(store.smove("src", "dst", "m").await.unwrap());
        assert!(!store.smove("src", "dst", "m").await.unwrap());
        assert!(store.sismember("dst", "m").await.unwrap());
        assert_eq!(store.smembers("dst").await.unwrap(), vec!["m".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_glob() {
        let (_dir, store) = store().await;
        store.hset("workflows.a_100_0", "f", "v").await.unwrap();
        store.hset("workflows.b_100_200", "f", "v").await.unwrap();
        store.hset("workflows.lookup", "a", "x").await.unwrap();
        store.set("workflows.markers.a.start", "100").await.unwrap();

        let finished = store.scan("workflows.*_*_[^0]*", 10).await.unwrap();
        assert_eq!(finished, vec!["workflows.b_100_200".to_string()]);
        assert_eq!(store.scan("workflows.*", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_failure() {
        let (_dir, store) = store().await;
        let result = store
            .batch(vec![
                KvOp::Set {
                    key: "marker".to_string(),
                    value: "1".to_string(),
                },
                KvOp::Rename {
                    from: "missing".to_string(),
                    to: "elsewhere".to_string(),
                },
            ])
            .await;
        assert!(matches!(result, Err(StoreError::NoSuchKey(_))));
        assert_eq!(store.get("marker").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keyed_storage_lifecycle_on_sqlite() {
        let (_dir, store) = store().await;
        let config = Arc::new(FlowConfig::default());
        let rules = Arc::new(RuleRegistry::new());
        let storage = KeyedStorage::new(Arc::new(store), config, rules);

        let mut wf = Workflow::new("wf_1", vec![TaskState::new("only")])
            .unwrap()
            .with_success(SuccessPolicy::AllSucceeded);
        storage.store_workflow(&mut wf, true).await.unwrap();
        assert!(storage.already_started("wf_1").await.unwrap());

        let mut task = TaskState::new("only");
        task.succeed();
        storage.store_task("wf_1", &task).await.unwrap();

        assert!(!storage.already_started("wf_1").await.unwrap());
        assert!(!storage.succeed_workflow("wf_1").await.unwrap());
        let list = storage.list_workflows().await.unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].is_finished());
        assert_eq!(storage.destroy_succeeded_workflows().await.unwrap(), 1);
    }
}
