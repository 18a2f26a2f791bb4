//! Engine configuration.
//!
//! `FlowConfig` is the top-level `taskflow.toml`. It is loaded once at startup
//! and handed to the client, the worker, and the storage layer as an
//! immutable value. All fields have sensible defaults.

use serde::{Deserialize, Serialize};

use crate::task::TaskState;

/// Top-level configuration for a taskflow deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Prefix for every storage key.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Queue assigned to tasks built through [`FlowConfig::task`].
    #[serde(default = "default_queue")]
    pub default_queue: String,

    /// Retry budget assigned to tasks built through [`FlowConfig::task`].
    #[serde(default)]
    pub default_retries: u32,

    /// Physical encoding of workflow aggregates.
    #[serde(default)]
    pub storage: StorageEncoding,

    /// Fall back to a `{ns}.{id}_*` key scan when neither the lookup index
    /// nor the timestamp markers know a workflow.
    #[serde(default)]
    pub legacy_scan_fallback: bool,

    /// `COUNT` hint for key scans.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,

    /// How far ahead of now an inline task may be scheduled and still run
    /// in-process.
    #[serde(default = "default_inline_lookahead_secs")]
    pub inline_lookahead_secs: i64,

    /// Delay before re-enqueueing an inline child that failed and awaits retry.
    #[serde(default = "default_inline_retry_delay_secs")]
    pub inline_retry_delay_secs: i64,

    /// SQLite URL; derived from the data directory when absent.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How workflow aggregates map onto store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEncoding {
    /// `{ns}.{id}_{start}_{end}` keys with a lookup index and timestamp markers.
    Keyed,
    /// `{ns}.set.{id}` keys tracked by in-progress/finished index sets.
    Set,
}

impl Default for StorageEncoding {
    fn default() -> Self {
        StorageEncoding::Keyed
    }
}

/// Job polling settings for the worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_queues")]
    pub queues: Vec<String>,

    /// Number of concurrent job loops.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a claimed job stays invisible to other pollers.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: default_worker_queues(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            otel: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

fn default_namespace() -> String {
    "workflows".to_string()
}

fn default_queue() -> String {
    crate::task::DEFAULT_QUEUE.to_string()
}

fn default_scan_count() -> usize {
    2000
}

fn default_inline_lookahead_secs() -> i64 {
    1
}

fn default_inline_retry_delay_secs() -> i64 {
    5
}

fn default_worker_queues() -> Vec<String> {
    vec![default_queue()]
}

fn default_concurrency() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_visibility_timeout_secs() -> i64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_queue: default_queue(),
            default_retries: 0,
            storage: StorageEncoding::default(),
            legacy_scan_fallback: false,
            scan_count: default_scan_count(),
            inline_lookahead_secs: default_inline_lookahead_secs(),
            inline_retry_delay_secs: default_inline_retry_delay_secs(),
            database_url: None,
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FlowConfig {
    /// New task carrying this deployment's default queue and retry budget.
    pub fn task(&self, id: impl Into<String>) -> TaskState {
        TaskState::new(id)
            .with_queue(self.default_queue.clone())
            .with_retries(self.default_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_config_default_values() {
        let config = FlowConfig::default();
        assert_eq!(config.namespace, "workflows");
        assert_eq!(config.default_queue, "default");
        assert_eq!(config.default_retries, 0);
        assert_eq!(config.storage, StorageEncoding::Keyed);
        assert!(!config.legacy_scan_fallback);
        assert_eq!(config.scan_count, 2000);
        assert_eq!(config.inline_lookahead_secs, 1);
        assert_eq!(config.inline_retry_delay_secs, 5);
        assert_eq!(config.worker.concurrency, 10);
        assert_eq!(config.worker.queues, vec!["default".to_string()]);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_flow_config_empty_toml_uses_defaults() {
        let config: FlowConfig = toml::from_str("").unwrap();
        assert_eq!(config, FlowConfig::default());
    }

    #[test]
    fn test_flow_config_parses_toml() {
        let toml_str = r#"
namespace = "pipelines"
default_retries = 3
storage = "set"
legacy_scan_fallback = true

[worker]
queues = ["default", "critical"]
concurrency = 4

[logging]
format = "json"
otel = true
"#;
        let config: FlowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.namespace, "pipelines");
        assert_eq!(config.default_retries, 3);
        assert_eq!(config.storage, StorageEncoding::Set);
        assert!(config.legacy_scan_fallback);
        assert_eq!(config.worker.queues.len(), 2);
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.poll_interval_ms, 500);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.logging.otel);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_task_uses_configured_defaults() {
        let config = FlowConfig {
            default_queue: "batch".to_string(),
            default_retries: 5,
            ..FlowConfig::default()
        };
        let task = config.task("export");
        assert_eq!(task.queue, "batch");
        assert_eq!(task.retries, 5);
    }
}
