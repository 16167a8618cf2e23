use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, typed projection from a record to one of its fields.
///
/// Field paths are comparable and serializable but otherwise meaningless to
/// the migration core; the wrapped engines are the only thing that actually
/// resolves them against a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DataClassPath(String);

impl DataClassPath {
    pub fn new(path: impl Into<String>) -> Self {
        DataClassPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataClassPath {
    fn from(value: &str) -> Self {
        DataClassPath::new(value)
    }
}

impl From<String> for DataClassPath {
    fn from(value: String) -> Self {
        DataClassPath::new(value)
    }
}
