//! Task state: the persisted attributes of one node in a workflow graph.
//!
//! A task is identified by its type id (unique within a workflow). Its status
//! moves along a fixed set of edges:
//!
//! ```text
//! pending -> enqueued -> succeeded | failed | skipped | awaiting_retry
//! awaiting_retry -> enqueued
//! any -> pending            (explicit clear, used by manual restarts)
//! ```
//!
//! Timestamps are epoch seconds, matching the storage key encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default queue name for tasks that do not pick one.
pub const DEFAULT_QUEUE: &str = "default";

/// Name of the trigger rule used when a task does not declare one.
pub const DEFAULT_TRIGGER_RULE: &str = "all_succeeded";

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Enqueued,
    Succeeded,
    Failed,
    Skipped,
    AwaitingRetry,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Enqueued => "enqueued",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::AwaitingRetry => "awaiting_retry",
        }
    }

    /// Succeeded, failed, or skipped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Owned by the job queue right now (enqueued or waiting for redelivery).
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskStatus::Enqueued | TaskStatus::AwaitingRetry)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "enqueued" => Ok(TaskStatus::Enqueued),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            "skipped" => Ok(TaskStatus::Skipped),
            "awaiting_retry" => Ok(TaskStatus::AwaitingRetry),
            other => Err(format!("invalid task status: '{other}'")),
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// TriggerRuleSpec
// ---------------------------------------------------------------------------

/// Persisted reference to a trigger rule: a registry name plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRuleSpec {
    pub name: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl TriggerRuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    /// Add one option to the rule.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn all_succeeded() -> Self {
        Self::new("all_succeeded")
    }

    pub fn one_succeeded() -> Self {
        Self::new("one_succeeded")
    }

    pub fn all_done() -> Self {
        Self::new("all_done")
    }

    pub fn number_succeeded(number: u64) -> Self {
        Self::new("number_succeeded").with_option("number", number)
    }
}

impl Default for TriggerRuleSpec {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_RULE)
    }
}

impl fmt::Display for TriggerRuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.options.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, Value::Object(self.options.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Persisted state of a single task inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// Task type id, unique within its workflow.
    pub id: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// `None` marks the task as externally triggered.
    #[serde(default)]
    pub start_date: Option<i64>,
    /// Deadline after which the task is force-failed instead of executed.
    #[serde(default)]
    pub end_date: Option<i64>,
    /// Seconds to wait before re-running after a repeat request.
    #[serde(default)]
    pub loop_interval: u64,
    /// Retry budget handed to the job queue.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub trigger_rule: TriggerRuleSpec,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub error_msg: Option<String>,
    /// Derived from every other task's `children`; never persisted.
    #[serde(skip)]
    pub parents: Vec<String>,
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

impl TaskState {
    /// New pending task scheduled to start at `start_date` (or immediately).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            start_date: Some(chrono::Utc::now().timestamp()),
            end_date: None,
            loop_interval: 0,
            retries: 0,
            queue: default_queue(),
            children: Vec::new(),
            trigger_rule: TriggerRuleSpec::default(),
            params: Value::Object(Map::new()),
            inline: false,
            error_msg: None,
            parents: Vec::new(),
        }
    }

    // -- builder ------------------------------------------------------------

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_trigger_rule(mut self, rule: TriggerRuleSpec) -> Self {
        self.trigger_rule = rule;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_start_date(mut self, start_date: Option<i64>) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn with_end_date(mut self, end_date: Option<i64>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn with_loop_interval(mut self, secs: u64) -> Self {
        self.loop_interval = secs;
        self
    }

    pub fn with_inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    /// Only runs after an explicit manual start.
    pub fn external(self) -> Self {
        self.with_start_date(None)
    }

    // -- transitions --------------------------------------------------------

    pub fn enqueue(&mut self) {
        self.status = TaskStatus::Enqueued;
    }

    pub fn succeed(&mut self) {
        self.status = TaskStatus::Succeeded;
    }

    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
    }

    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
    }

    pub fn await_retry(&mut self) {
        self.status = TaskStatus::AwaitingRetry;
    }

    pub fn clear(&mut self) {
        self.status = TaskStatus::Pending;
    }

    /// Drop both dates, turning the task into an externally triggered one.
    pub fn clear_dates(&mut self) {
        self.start_date = None;
        self.end_date = None;
    }

    /// Back to pending for a branch restart.
    ///
    /// Keeps `start_date` so descendants stay automatically triggerable once
    /// their parents succeed again; drops the deadline and the last error.
    pub fn reset_for_restart(&mut self) {
        self.status = TaskStatus::Pending;
        self.end_date = None;
        self.error_msg = None;
    }

    pub fn set_queue(&mut self, queue: impl Into<String>) {
        self.queue = queue.into();
    }

    pub fn set_error_msg(&mut self, msg: impl Into<String>) {
        self.error_msg = Some(msg.into());
    }

    // -- predicates ---------------------------------------------------------

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_enqueued(&self) -> bool {
        self.status == TaskStatus::Enqueued
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == TaskStatus::Skipped
    }

    pub fn is_awaiting_retry(&self) -> bool {
        self.status == TaskStatus::AwaitingRetry
    }

    pub fn is_external_trigger(&self) -> bool {
        self.start_date.is_none()
    }

    pub fn has_no_retries(&self) -> bool {
        self.retries == 0
    }

    /// Deadline present and already passed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.end_date, Some(end) if now > end)
    }

    /// Inline task whose start time falls within `lookahead_secs` of `now`.
    pub fn is_ready_to_perform_inline(&self, now: i64, lookahead_secs: i64) -> bool {
        self.inline && matches!(self.start_date, Some(start) if start <= now + lookahead_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let task = TaskState::new("fetch");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.start_date.is_some());
        assert_eq!(task.end_date, None);
        assert_eq!(task.retries, 0);
        assert_eq!(task.queue, "default");
        assert_eq!(task.trigger_rule.name, "all_succeeded");
        assert!(task.children.is_empty());
        assert!(!task.inline);
    }

    #[test]
    fn test_status_display_and_from_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Enqueued,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Skipped,
            TaskStatus::AwaitingRetry,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("running".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::AwaitingRetry).unwrap();
        assert_eq!(json, "\"awaiting_retry\"");
    }

    #[test]
    fn test_external_trigger() {
        let task = TaskState::new("manual").external();
        assert!(task.is_external_trigger());
    }

    #[test]
    fn test_expired() {
        let task = TaskState::new("t").with_end_date(Some(100));
        assert!(!task.is_expired(100));
        assert!(task.is_expired(101));
        assert!(!TaskState::new("t").is_expired(i64::MAX));
    }

    #[test]
    fn test_ready_to_perform_inline() {
        let task = TaskState::new("t").with_inline(true).with_start_date(Some(101));
        assert!(task.is_ready_to_perform_inline(100, 1));
        assert!(!task.is_ready_to_perform_inline(99, 1));

        let not_inline = TaskState::new("t").with_start_date(Some(0));
        assert!(!not_inline.is_ready_to_perform_inline(100, 1));

        let external = TaskState::new("t").with_inline(true).external();
        assert!(!external.is_ready_to_perform_inline(100, 1));
    }

    #[test]
    fn test_transitions() {
        let mut task = TaskState::new("t").with_retries(2);
        task.enqueue();
        assert!(task.is_enqueued());
        assert!(task.status.is_in_flight());
        task.await_retry();
        assert!(task.is_awaiting_retry());
        task.enqueue();
        task.succeed();
        assert!(task.status.is_terminal());
        task.clear();
        assert!(task.is_pending());
    }

    #[test]
    fn test_clear_dates_makes_task_external() {
        let mut task = TaskState::new("t").with_end_date(Some(10));
        task.clear_dates();
        assert!(task.is_external_trigger());
        assert_eq!(task.end_date, None);
    }

    #[test]
    fn test_reset_for_restart_keeps_start_date() {
        let mut task = TaskState::new("t")
            .with_start_date(Some(42))
            .with_end_date(Some(50));
        task.fail();
        task.set_error_msg("boom");
        task.reset_for_restart();
        assert!(task.is_pending());
        assert_eq!(task.start_date, Some(42));
        assert_eq!(task.end_date, None);
        assert_eq!(task.error_msg, None);
    }

    #[test]
    fn test_parents_are_not_serialized() {
        let mut task = TaskState::new("child");
        task.parents = vec!["parent".to_string()];
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("parents").is_none());

        let back: TaskState = serde_json::from_value(json).unwrap();
        assert!(back.parents.is_empty());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let task: TaskState = serde_json::from_str(r#"{"id":"t"}"#).unwrap();
        assert_eq!(task.queue, "default");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.is_external_trigger());
        assert_eq!(task.trigger_rule, TriggerRuleSpec::all_succeeded());
    }

    #[test]
    fn test_trigger_rule_display() {
        assert_eq!(TriggerRuleSpec::all_done().to_string(), "all_done");
        assert_eq!(
            TriggerRuleSpec::number_succeeded(2).to_string(),
            "number_succeeded:{\"number\":2}"
        );
    }
}
