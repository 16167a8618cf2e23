use crate::query::path::DataClassPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortPart {
    pub path: DataClassPath,
    pub ascending: bool,
}

impl SortPart {
    pub fn ascending(path: impl Into<DataClassPath>) -> Self {
        SortPart {
            path: path.into(),
            ascending: true,
        }
    }
}
