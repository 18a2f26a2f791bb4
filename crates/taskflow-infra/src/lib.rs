//! Infrastructure implementations for taskflow.
//!
//! SQLite-backed [`taskflow_core::storage::KeyValueStore`] and
//! [`taskflow_core::queue::JobQueue`], the polling worker pool that drives
//! [`taskflow_core::worker::Worker`], and the `taskflow.toml` loader.

pub mod config;
pub mod runner;
pub mod sqlite;

use std::sync::Arc;

use taskflow_core::client::Client;
use taskflow_core::storage::Storage;
use taskflow_core::worker::Worker;
use taskflow_core::workflow::RuleRegistry;
use taskflow_types::config::FlowConfig;

use sqlite::kv::SqliteKvStore;
use sqlite::pool::DatabasePool;
use sqlite::queue::SqliteJobQueue;

pub type SqliteStorage = Storage<SqliteKvStore>;
pub type SqliteClient = Client<SqliteStorage, SqliteJobQueue>;
pub type SqliteWorker = Worker<SqliteStorage, SqliteJobQueue>;

/// Open the configured database and build a client over it.
///
/// The store and the job queue share one pool, so a task write and its job
/// insert go through the same writer connection.
pub async fn open_client(
    config: Arc<FlowConfig>,
    rules: Arc<RuleRegistry>,
) -> Result<SqliteClient, sqlx::Error> {
    if config.database_url.is_none() {
        tokio::fs::create_dir_all(sqlite::pool::default_data_dir())
            .await
            .map_err(sqlx::Error::Io)?;
    }
    let url = config::resolve_database_url(&config);
    let pool = DatabasePool::new(&url).await?;

    let store = Arc::new(SqliteKvStore::new(pool.clone()));
    let queue = Arc::new(SqliteJobQueue::new(pool));
    let storage = Storage::new(store, config.clone(), rules.clone());
    Ok(Client::new(storage, queue, config, rules))
}
