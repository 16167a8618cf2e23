use crate::query::{path::DataClassPath, value::Value};
use serde::{Deserialize, Serialize};

/// An opaque description of a write's effect on a record, handed to the
/// wrapped engines verbatim. `Assign` is what the backfill upsert and the
/// `Insert`-as-`Upsert` replays use; the other variants exist so caller
/// `updateOne`/`updateMany` calls can be faithfully re-run on the secondary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Modification {
    Assign(serde_json::Value),
    Set(DataClassPath, Value),
    Increment(DataClassPath, f64),
    Combine(Vec<Modification>),
}
