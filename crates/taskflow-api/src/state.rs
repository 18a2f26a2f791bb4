//! Application state for CLI commands.
//!
//! Pins the generic client to the SQLite store and job queue.

use std::path::Path;
use std::sync::Arc;

use taskflow_core::workflow::RuleRegistry;
use taskflow_infra::SqliteClient;
use taskflow_infra::config::{default_config_path, load_config};
use taskflow_types::config::FlowConfig;

pub struct AppState {
    pub client: SqliteClient,
    pub config: Arc<FlowConfig>,
}

impl AppState {
    /// Load configuration (explicit path or the data-directory default).
    pub async fn load_config(path: Option<&Path>) -> FlowConfig {
        match path {
            Some(path) => load_config(path).await,
            None => load_config(&default_config_path()).await,
        }
    }

    /// Open the database and wire the client.
    ///
    /// Only the built-in trigger rules are registered; a workflow whose
    /// success policy names a custom check cannot be re-evaluated from here.
    pub async fn init(config: FlowConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let rules = Arc::new(RuleRegistry::new());
        let client = taskflow_infra::open_client(config.clone(), rules).await?;
        Ok(Self { client, config })
    }
}
