use serde::{Deserialize, Serialize};

/// Opaque aggregation operator, handed to the wrapped engine's
/// `aggregate`/`groupAggregate` verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}
