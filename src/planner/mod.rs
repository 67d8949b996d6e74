//! Rule-based decision making.
//!
//! The planner evaluates an ordered, priority-sorted rule set against a
//! [`PlanContext`] and returns the plan of the best matching rule. Rule
//! mutation is safe while matching is in flight; the active collection is
//! only ever observed under the read lock or swapped whole under the write
//! lock.

use thiserror::Error;

pub mod cache;
pub mod condition;
#[allow(clippy::module_inception)]
pub mod planner;
pub mod rules;

pub use cache::TtlCache;
pub use condition::{CompareOp, Condition};
pub use planner::{Plan, Planner, NOOP_ACTION};
pub use rules::{default_rules, Rule, RuleSet};

/// The opaque context value rules are evaluated against.
pub type PlanContext = crate::event::Metadata;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("rule '{0}' already exists")]
    DuplicateRule(String),
    #[error("error evaluating rule '{rule}': {message}")]
    Evaluation { rule: String, message: String },
    #[error("condition error: {0}")]
    Condition(String),
}
