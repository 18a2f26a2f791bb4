//! Trigger rules: policies answering "are this task's dependencies satisfied?"
//!
//! A rule is a pure function of the current status of a task's parents.
//! Instances are built per evaluation from a [`TriggerRuleSpec`] through the
//! [`RuleRegistry`](super::registry::RuleRegistry).

use serde_json::{Map, Value};
use taskflow_types::error::FlowError;
use taskflow_types::task::TaskState;

/// Readiness policy over a snapshot of parent tasks.
pub trait TriggerRule: Send + Sync {
    fn met(&self, parents: &[&TaskState]) -> bool;
}

/// Every parent succeeded.
pub struct AllSucceeded;

impl TriggerRule for AllSucceeded {
    fn met(&self, parents: &[&TaskState]) -> bool {
        parents.iter().all(|t| t.is_succeeded())
    }
}

/// At least one parent succeeded.
pub struct OneSucceeded;

impl TriggerRule for OneSucceeded {
    fn met(&self, parents: &[&TaskState]) -> bool {
        parents.iter().any(|t| t.is_succeeded())
    }
}

/// Every parent succeeded or was skipped.
pub struct AllDone;

impl TriggerRule for AllDone {
    fn met(&self, parents: &[&TaskState]) -> bool {
        parents.iter().all(|t| t.is_succeeded() || t.is_skipped())
    }
}

/// At least `number` parents succeeded.
pub struct NumberSucceeded {
    pub number: usize,
}

impl NumberSucceeded {
    /// Build from rule options; requires a non-negative integer `number`.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, FlowError> {
        let invalid = |reason: &str| FlowError::InvalidTriggerRule {
            rule: "number_succeeded".to_string(),
            reason: reason.to_string(),
        };
        let number = options
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("option 'number' must be a non-negative integer"))?;
        let number = usize::try_from(number)
            .map_err(|_| invalid("option 'number' does not fit this platform's usize"))?;
        Ok(Self { number })
    }
}

impl TriggerRule for NumberSucceeded {
    fn met(&self, parents: &[&TaskState]) -> bool {
        parents.iter().filter(|t| t.is_succeeded()).count() >= self.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskflow_types::task::TaskStatus;

    fn task(id: &str, status: TaskStatus) -> TaskState {
        let mut t = TaskState::new(id);
        t.status = status;
        t
    }

    #[test]
    fn test_all_succeeded() {
        let a = task("a", TaskStatus::Succeeded);
        let b = task("b", TaskStatus::Succeeded);
        let c = task("c", TaskStatus::Skipped);
        assert!(AllSucceeded.met(&[&a, &b]));
        assert!(!AllSucceeded.met(&[&a, &c]));
    }

    #[test]
    fn test_all_succeeded_without_parents() {
        assert!(AllSucceeded.met(&[]));
    }

    #[test]
    fn test_one_succeeded() {
        let a = task("a", TaskStatus::Failed);
        let b = task("b", TaskStatus::Succeeded);
        assert!(OneSucceeded.met(&[&a, &b]));
        assert!(!OneSucceeded.met(&[&a]));
        assert!(!OneSucceeded.met(&[]));
    }

    #[test]
    fn test_all_done() {
        let a = task("a", TaskStatus::Succeeded);
        let b = task("b", TaskStatus::Skipped);
        let c = task("c", TaskStatus::Failed);
        assert!(AllDone.met(&[&a, &b]));
        assert!(!AllDone.met(&[&a, &b, &c]));
    }

    #[test]
    fn test_number_succeeded_is_order_independent() {
        let rule = NumberSucceeded { number: 2 };
        let ok = task("ok", TaskStatus::Succeeded);
        let ok2 = task("ok2", TaskStatus::Succeeded);
        let bad = task("bad", TaskStatus::Failed);
        let pending = task("pending", TaskStatus::Pending);

        let orders: [[&TaskState; 4]; 3] = [
            [&ok, &ok2, &bad, &pending],
            [&bad, &pending, &ok, &ok2],
            [&ok, &bad, &pending, &ok2],
        ];
        for parents in &orders {
            assert!(rule.met(parents));
        }
        assert!(!rule.met(&[&ok, &bad, &pending]));
    }

    #[test]
    fn test_number_succeeded_from_options() {
        let opts = json!({"number": 3});
        let rule = NumberSucceeded::from_options(opts.as_object().unwrap()).unwrap();
        assert_eq!(rule.number, 3);
    }

    #[test]
    fn test_number_succeeded_rejects_bad_options() {
        let missing = Map::new();
        assert!(matches!(
            NumberSucceeded::from_options(&missing),
            Err(FlowError::InvalidTriggerRule { .. })
        ));

        let negative = json!({"number": -1});
        assert!(NumberSucceeded::from_options(negative.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_number_succeeded_largest_count() {
        let opts = json!({"number": u64::MAX});
        match usize::try_from(u64::MAX) {
            Ok(max) => {
                let rule = NumberSucceeded::from_options(opts.as_object().unwrap()).unwrap();
                assert_eq!(rule.number, max);
            }
            Err(_) => assert!(matches!(
                NumberSucceeded::from_options(opts.as_object().unwrap()),
                Err(FlowError::InvalidTriggerRule { .. })
            )),
        }

        let fractional = json!({"number": 1.5});
        assert!(matches!(
            NumberSucceeded::from_options(fractional.as_object().unwrap()),
            Err(FlowError::InvalidTriggerRule { .. })
        ));
    }
}
