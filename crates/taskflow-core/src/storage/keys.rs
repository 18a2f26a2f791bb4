//! Storage key naming.
//!
//! Keyed encoding:
//!
//! ```text
//! {ns}.{id}_{start}_{end}        aggregate hash, end = 0 while in progress
//! {ns}.lookup                    hash: workflow id -> current aggregate key
//! {ns}.markers.{id}.start        start timestamp marker
//! {ns}.markers.{id}.end          end timestamp marker
//! ```
//!
//! Set encoding:
//!
//! ```text
//! {ns}.set.{id}                  aggregate hash
//! {ns}.set.in-progress           set of aggregate keys
//! {ns}.set.finished              set of aggregate keys
//! ```

use super::pattern::escape;

/// Parsed form of a `{ns}.{id}_{start}_{end}` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowKey {
    pub id: String,
    pub start: i64,
    /// 0 while the workflow is in progress.
    pub end: i64,
}

impl WorkflowKey {
    pub fn is_finished(&self) -> bool {
        self.end != 0
    }
}

/// Key builder for one namespace.
#[derive(Debug, Clone)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn workflow_key(&self, id: &str, start: i64, end: i64) -> String {
        format!("{}.{id}_{start}_{end}", self.namespace)
    }

    pub fn lookup_index(&self) -> String {
        format!("{}.lookup", self.namespace)
    }

    pub fn start_marker(&self, id: &str) -> String {
        format!("{}.markers.{id}.start", self.namespace)
    }

    pub fn end_marker(&self, id: &str) -> String {
        format!("{}.markers.{id}.end", self.namespace)
    }

    /// Parse an aggregate key of this namespace.
    ///
    /// Splits from the right so workflow ids may themselves contain `_`.
    /// Returns None for index, marker, and foreign keys.
    pub fn parse(&self, key: &str) -> Option<WorkflowKey> {
        let rest = key.strip_prefix(&self.namespace)?.strip_prefix('.')?;
        let mut parts = rest.rsplitn(3, '_');
        let end = parts.next()?.parse::<i64>().ok()?;
        let start = parts.next()?.parse::<i64>().ok()?;
        let id = parts.next()?;
        if id.is_empty() || start <= 0 || end < 0 {
            return None;
        }
        Some(WorkflowKey {
            id: id.to_string(),
            start,
            end,
        })
    }

    // -- scan patterns ------------------------------------------------------

    /// Every key of the namespace (parse to keep only aggregates).
    pub fn all_pattern(&self) -> String {
        format!("{}.*", escape(&self.namespace))
    }

    /// Keys with a non-zero end timestamp (parse to drop false positives).
    pub fn finished_pattern(&self) -> String {
        format!("{}.*_*_[^0]*", escape(&self.namespace))
    }

    /// Aggregates of `id` started at `start`, whatever their end timestamp.
    pub fn started_at_pattern(&self, id: &str, start: i64) -> String {
        format!("{}.{}_{start}_*", escape(&self.namespace), escape(id))
    }

    /// Every aggregate of `id`; also matches ids that merely share the prefix.
    pub fn legacy_pattern(&self, id: &str) -> String {
        format!("{}.{}_*", escape(&self.namespace), escape(id))
    }

    // -- set encoding -------------------------------------------------------

    pub fn set_key(&self, id: &str) -> String {
        format!("{}.set.{id}", self.namespace)
    }

    pub fn in_progress_set(&self) -> String {
        format!("{}.set.in-progress", self.namespace)
    }

    pub fn finished_set(&self) -> String {
        format!("{}.set.finished", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pattern::matches;

    fn keys() -> KeySpace {
        KeySpace::new("workflows")
    }

    #[test]
    fn test_workflow_key_format() {
        assert_eq!(keys().workflow_key("order-1", 100, 0), "workflows.order-1_100_0");
        assert_eq!(keys().lookup_index(), "workflows.lookup");
        assert_eq!(keys().start_marker("a"), "workflows.markers.a.start");
        assert_eq!(keys().end_marker("a"), "workflows.markers.a.end");
    }

    #[test]
    fn test_parse_roundtrip_with_underscores_in_id() {
        let key = keys().workflow_key("batch_2024_q1", 1700000000, 1700000500);
        let parsed = keys().parse(&key).unwrap();
        assert_eq!(parsed.id, "batch_2024_q1");
        assert_eq!(parsed.start, 1700000000);
        assert_eq!(parsed.end, 1700000500);
        assert!(parsed.is_finished());
    }

    #[test]
    fn test_parse_rejects_non_aggregate_keys() {
        let ks = keys();
        assert_eq!(ks.parse("workflows.lookup"), None);
        assert_eq!(ks.parse("workflows.markers.a_1.start"), None);
        assert_eq!(ks.parse("workflows.set.a"), None);
        assert_eq!(ks.parse("other.a_1_0"), None);
        assert_eq!(ks.parse("workflows._1_0"), None);
        assert_eq!(ks.parse("workflowsx.a_1_0"), None);
    }

    #[test]
    fn test_finished_pattern_false_positive_filtered_by_parse() {
        let ks = keys();
        let in_progress = ks.workflow_key("my_id", 1700, 0);
        assert!(matches(&ks.finished_pattern(), &in_progress));
        assert!(!ks.parse(&in_progress).unwrap().is_finished());
    }

    #[test]
    fn test_started_at_pattern() {
        let ks = keys();
        let pattern = ks.started_at_pattern("a", 100);
        assert!(matches(&pattern, "workflows.a_100_0"));
        assert!(matches(&pattern, "workflows.a_100_200"));
        assert!(!matches(&pattern, "workflows.a_101_0"));
    }

    #[test]
    fn test_set_keys() {
        let ks = keys();
        assert_eq!(ks.set_key("a"), "workflows.set.a");
        assert_eq!(ks.in_progress_set(), "workflows.set.in-progress");
        assert_eq!(ks.finished_set(), "workflows.set.finished");
    }
}
