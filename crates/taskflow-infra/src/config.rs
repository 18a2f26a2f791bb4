//! Configuration loader for taskflow.
//!
//! Reads `taskflow.toml` and deserializes it into [`FlowConfig`]. Falls back
//! to defaults when the file is missing or malformed, so a worker always
//! starts with a usable configuration.

use std::path::{Path, PathBuf};

use taskflow_types::config::FlowConfig;

use crate::sqlite::pool::{default_data_dir, default_database_url};

pub const CONFIG_FILE_NAME: &str = "taskflow.toml";

/// `{data_dir}/taskflow.toml`.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join(CONFIG_FILE_NAME)
}

/// Load configuration from `path`.
///
/// - Missing file: [`FlowConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(path: &Path) -> FlowConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return FlowConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read config, using defaults");
            return FlowConfig::default();
        }
    };

    match toml::from_str::<FlowConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse config, using defaults");
            FlowConfig::default()
        }
    }
}

/// Database URL from the config, else the data-directory default.
pub fn resolve_database_url(config: &FlowConfig) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(default_database_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_types::config::StorageEncoding;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILE_NAME)).await;
        assert_eq!(config, FlowConfig::default());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            r#"
namespace = "jobs"
storage = "set"
database_url = "sqlite:///tmp/flows.db"

[worker]
concurrency = 2
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.namespace, "jobs");
        assert_eq!(config.storage, StorageEncoding::Set);
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(resolve_database_url(&config), "sqlite:///tmp/flows.db");
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "namespace = [not valid").await.unwrap();
        assert_eq!(load_config(&path).await, FlowConfig::default());
    }

    #[test]
    fn resolve_database_url_falls_back_to_data_dir() {
        let url = resolve_database_url(&FlowConfig::default());
        assert!(url.ends_with("taskflow.db"));
    }
}
