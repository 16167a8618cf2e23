use crate::query::{path::DataClassPath, value::Value};
use serde::{Deserialize, Serialize};

/// An opaque, comparable predicate over records.
///
/// `Condition` is never interpreted by the migration core — it is built by
/// callers (or by the facade itself, e.g. for backfill paging and verifier
/// lookups) and handed verbatim to whichever engine is asked to evaluate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Condition {
    Always,
    Never,
    Equals(DataClassPath, Value),
    NotEquals(DataClassPath, Value),
    GreaterThan(DataClassPath, Value),
    GreaterThanOrEqual(DataClassPath, Value),
    LessThan(DataClassPath, Value),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn equals(path: impl Into<DataClassPath>, value: Value) -> Self {
        Condition::Equals(path.into(), value)
    }

    pub fn greater_than(path: impl Into<DataClassPath>, value: Value) -> Self {
        Condition::GreaterThan(path.into(), value)
    }
}
