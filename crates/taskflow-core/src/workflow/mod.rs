//! Workflow aggregate and readiness policies.
//!
//! - `trigger_rule` -- built-in rules deciding when a task's parents allow it to run
//! - `registry` -- name-indexed trigger rules and workflow success checks
//! - `dag` -- the `Workflow` aggregate: task arena, parent derivation, branch clearing

pub mod dag;
pub mod registry;
pub mod trigger_rule;

pub use dag::Workflow;
pub use registry::RuleRegistry;
pub use trigger_rule::TriggerRule;
