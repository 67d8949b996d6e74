//! Rule condition algebra.
//!
//! A small closed set of predicate variants evaluated by one dispatcher
//! against a [`PlanContext`]. Combinators (`All`, `Any`, `Not`) nest freely.

use crate::event::MetadataValue;
use crate::planner::{PlanContext, PlannerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comparison operator for [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match on string fields.
    Contains,
}

/// A predicate over a plan context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// Compare one context field against a literal.
    Compare {
        field: String,
        op: CompareOp,
        value: MetadataValue,
    },
    /// True when every inner condition is true. Empty means true.
    All(Vec<Condition>),
    /// True when at least one inner condition is true. Empty means false.
    Any(Vec<Condition>),
    Not(Box<Condition>),
    /// True when the context timestamp (or, absent one, the current time)
    /// falls in `[start, end)`.
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Condition {
    /// Evaluate against a context.
    ///
    /// A missing field is a non-match, not an error. A comparison whose
    /// operand types do not line up is an error: a rule that cannot be
    /// evaluated must not silently exclude itself.
    pub fn evaluate(&self, ctx: &PlanContext) -> Result<bool, PlannerError> {
        match self {
            Condition::Compare { field, op, value } => match ctx.get(field) {
                Some(actual) => compare(field, actual, *op, value),
                None => Ok(false),
            },
            Condition::All(conditions) => {
                for condition in conditions {
                    if !condition.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(conditions) => {
                for condition in conditions {
                    if condition.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(ctx)?),
            Condition::TimeRange { start, end } => {
                let at = context_time(ctx)?;
                Ok(at >= *start && at < *end)
            }
        }
    }
}

/// The instant a time-range condition is judged at.
fn context_time(ctx: &PlanContext) -> Result<DateTime<Utc>, PlannerError> {
    match ctx.get("timestamp") {
        Some(MetadataValue::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| PlannerError::Condition(format!("bad context timestamp '{raw}': {e}"))),
        Some(other) => Err(PlannerError::Condition(format!(
            "context timestamp must be an RFC3339 string, got {other:?}"
        ))),
        None => Ok(Utc::now()),
    }
}

fn compare(
    field: &str,
    actual: &MetadataValue,
    op: CompareOp,
    expected: &MetadataValue,
) -> Result<bool, PlannerError> {
    use CompareOp::*;
    use MetadataValue::*;

    match (actual, expected) {
        (Number(a), Number(b)) => Ok(match op {
            Eq => a == b,
            Ne => a != b,
            Gt => a > b,
            Gte => a >= b,
            Lt => a < b,
            Lte => a <= b,
            Contains => {
                return Err(type_mismatch(field, "contains", "number"));
            }
        }),
        (String(a), String(b)) => match op {
            Eq => Ok(a == b),
            Ne => Ok(a != b),
            Contains => Ok(a.contains(b.as_str())),
            _ => Err(type_mismatch(field, "ordering", "string")),
        },
        (Bool(a), Bool(b)) => match op {
            Eq => Ok(a == b),
            Ne => Ok(a != b),
            _ => Err(type_mismatch(field, "ordering", "bool")),
        },
        (Map(a), Map(b)) => match op {
            Eq => Ok(a == b),
            Ne => Ok(a != b),
            _ => Err(type_mismatch(field, "ordering", "map")),
        },
        (a, b) => Err(PlannerError::Condition(format!(
            "field '{field}': cannot compare {a:?} with {b:?}"
        ))),
    }
}

fn type_mismatch(field: &str, op_kind: &str, value_kind: &str) -> PlannerError {
    PlannerError::Condition(format!(
        "field '{field}': {op_kind} comparison not defined for {value_kind} values"
    ))
}
