use serde::{Deserialize, Serialize};

/// Severity ordering is ERROR > URGENT > WARNING > OK, preserved verbatim
/// from the source semantics per spec §9 Open Question 2 — see DESIGN.md for
/// why this reimplementation keeps that (admittedly surprising) order rather
/// than "fixing" it to the more conventional URGENT > ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthLevel {
    Ok = 0,
    Warning = 1,
    Urgent = 2,
    Error = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub level: HealthLevel,
    pub message: String,
}

impl HealthStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        HealthStatus {
            level: HealthLevel::Ok,
            message: message.into(),
        }
    }

    /// Combine two sub-statuses, keeping the worse of the two by the
    /// ERROR > URGENT > WARNING > OK ordering above.
    pub fn worse_of(a: HealthStatus, b: HealthStatus) -> HealthStatus {
        if a.level >= b.level { a } else { b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_outranks_urgent() {
        assert!(HealthLevel::Error > HealthLevel::Urgent);
        let combined = HealthStatus::worse_of(
            HealthStatus {
                level: HealthLevel::Urgent,
                message: "urgent".into(),
            },
            HealthStatus {
                level: HealthLevel::Error,
                message: "error".into(),
            },
        );
        assert_eq!(combined.level, HealthLevel::Error);
    }
}
