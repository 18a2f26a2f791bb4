//! Name-indexed registry of trigger rules and workflow success checks.
//!
//! Rules are persisted by name, so every process that evaluates a workflow
//! must resolve the same names. Unknown names are errors, never "not met".

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use taskflow_types::error::FlowError;
use taskflow_types::task::TriggerRuleSpec;

use super::dag::Workflow;
use super::trigger_rule::{AllDone, AllSucceeded, NumberSucceeded, OneSucceeded, TriggerRule};

/// Builds a rule instance from its persisted options.
pub type TriggerRuleFactory =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Box<dyn TriggerRule>, FlowError> + Send + Sync>;

/// Workflow-specific "has this workflow succeeded?" predicate.
pub type SuccessCheck = Arc<dyn Fn(&Workflow) -> bool + Send + Sync>;

/// Registry of trigger rules and named success checks.
///
/// `new()` comes with the four built-in rules registered.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, TriggerRuleFactory>,
    success_checks: HashMap<String, SuccessCheck>,
}

impl RuleRegistry {
    /// Registry with the built-in rules.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_trigger_rule("all_succeeded", |_| Ok(Box::new(AllSucceeded)));
        registry.register_trigger_rule("one_succeeded", |_| Ok(Box::new(OneSucceeded)));
        registry.register_trigger_rule("all_done", |_| Ok(Box::new(AllDone)));
        registry.register_trigger_rule("number_succeeded", |opts| {
            Ok(Box::new(NumberSucceeded::from_options(opts)?))
        });
        registry
    }

    /// Registry without any rules.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
            success_checks: HashMap::new(),
        }
    }

    /// Register a trigger rule factory. Replaces an existing one with the same name.
    pub fn register_trigger_rule<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Box<dyn TriggerRule>, FlowError>
            + Send
            + Sync
            + 'static,
    {
        self.rules.insert(name.into(), Arc::new(factory));
    }

    /// Register a success check referenced by `SuccessPolicy::Named`.
    pub fn register_success_check<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn(&Workflow) -> bool + Send + Sync + 'static,
    {
        self.success_checks.insert(name.into(), Arc::new(check));
    }

    /// Instantiate the rule a task refers to.
    pub fn build(&self, spec: &TriggerRuleSpec) -> Result<Box<dyn TriggerRule>, FlowError> {
        let factory = self
            .rules
            .get(&spec.name)
            .ok_or_else(|| FlowError::UnknownTriggerRule(spec.name.clone()))?;
        factory(&spec.options)
    }

    /// Check that a rule spec resolves, without keeping the instance.
    pub fn validate(&self, spec: &TriggerRuleSpec) -> Result<(), FlowError> {
        self.build(spec).map(|_| ())
    }

    pub fn success_check(&self, name: &str) -> Result<&SuccessCheck, FlowError> {
        self.success_checks
            .get(name)
            .ok_or_else(|| FlowError::UnknownSuccessCheck(name.to_string()))
    }

    /// List all registered rule names.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_types::task::{TaskState, TaskStatus};

    struct Never;

    impl TriggerRule for Never {
        fn met(&self, _parents: &[&TaskState]) -> bool {
            false
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = RuleRegistry::new();
        let mut names = registry.rule_names();
        names.sort();
        assert_eq!(
            names,
            vec!["all_done", "all_succeeded", "number_succeeded", "one_succeeded"]
        );
    }

    #[test]
    fn test_unknown_rule_fails_fast() {
        let registry = RuleRegistry::new();
        let err = registry
            .build(&TriggerRuleSpec::new("most_succeeded"))
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::UnknownTriggerRule(name) if name == "most_succeeded"));
    }

    #[test]
    fn test_build_number_succeeded() {
        let registry = RuleRegistry::new();
        let rule = registry.build(&TriggerRuleSpec::number_succeeded(1)).unwrap();
        let mut parent = TaskState::new("p");
        parent.status = TaskStatus::Succeeded;
        assert!(rule.met(&[&parent]));
    }

    #[test]
    fn test_validate_rejects_missing_option() {
        let registry = RuleRegistry::new();
        assert!(registry.validate(&TriggerRuleSpec::new("number_succeeded")).is_err());
    }

    #[test]
    fn test_register_custom_rule() {
        let mut registry = RuleRegistry::empty();
        registry.register_trigger_rule("never", |_| Ok(Box::new(Never)));
        let rule = registry.build(&TriggerRuleSpec::new("never")).unwrap();
        assert!(!rule.met(&[]));
        assert!(registry.validate(&TriggerRuleSpec::all_succeeded()).is_err());
    }

    #[test]
    fn test_unknown_success_check() {
        let registry = RuleRegistry::new();
        assert!(matches!(
            registry.success_check("shipped"),
            Err(FlowError::UnknownSuccessCheck(_))
        ));
    }
}
