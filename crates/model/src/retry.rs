use serde::{Deserialize, Serialize};

/// Tuning for a per-entity [`RetryQueue`](retry_queue::RetryQueue).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_queue_size: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            max_queue_size: 10_000,
        }
    }
}

use crate::query::{Condition, Modification, SortPart};

/// A faithful, serializable representation of a mutating table operation,
/// carrying exactly the arguments needed to re-execute it against the
/// secondary engine (spec §3, `RetryOperation<M>`).
///
/// `Insert::models` MUST hold the post-insert, server-assigned values
/// returned by the primary engine, never the caller's pre-insert inputs
/// (invariant I4) — callers are expected to construct this variant only
/// from a primary `insert` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RetryOperation<M> {
    Insert(Vec<M>),
    Replace {
        condition: Condition,
        model: M,
        order_by: Vec<SortPart>,
    },
    Upsert {
        condition: Condition,
        modification: Modification,
        model: M,
    },
    UpdateOne {
        condition: Condition,
        modification: Modification,
        order_by: Vec<SortPart>,
    },
    UpdateMany {
        condition: Condition,
        modification: Modification,
    },
    DeleteOne {
        condition: Condition,
        order_by: Vec<SortPart>,
    },
    DeleteMany {
        condition: Condition,
    },
}

impl<M> RetryOperation<M> {
    /// Short tag used in logs and metrics; avoids requiring `M: Debug` just
    /// to describe which kind of operation is queued.
    pub fn kind(&self) -> &'static str {
        match self {
            RetryOperation::Insert(_) => "insert",
            RetryOperation::Replace { .. } => "replace",
            RetryOperation::Upsert { .. } => "upsert",
            RetryOperation::UpdateOne { .. } => "update_one",
            RetryOperation::UpdateMany { .. } => "update_many",
            RetryOperation::DeleteOne { .. } => "delete_one",
            RetryOperation::DeleteMany { .. } => "delete_many",
        }
    }
}
