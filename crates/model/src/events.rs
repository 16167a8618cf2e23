use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured telemetry emitted by the facade for operator-facing
/// observability. Nothing in the core consumes these internally — they are
/// the integration seam a hosting service can subscribe to (mirrors the
/// wrapped engines' own `healthCheckFrequency`-style ambient reporting).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationEvent {
    PhaseChanged {
        table_name: Option<String>,
        from: Option<Phase>,
        to: Phase,
        timestamp: DateTime<Utc>,
    },
    SecondaryWriteQueued {
        table_name: String,
        operation: &'static str,
        timestamp: DateTime<Utc>,
    },
    SecondaryWriteExhausted {
        table_name: String,
        operation: &'static str,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
    BackfillStarted {
        table_name: String,
        timestamp: DateTime<Utc>,
    },
    BackfillProgress {
        table_name: String,
        processed_count: u64,
        error_count: u64,
        timestamp: DateTime<Utc>,
    },
    BackfillFinished {
        table_name: String,
        state: &'static str,
        timestamp: DateTime<Utc>,
    },
    VerificationCompleted {
        table_name: String,
        in_sync: bool,
        timestamp: DateTime<Utc>,
    },
}
