use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub batch_size: usize,
    pub delay_between_batches_ms: u64,
    pub max_errors_before_pause: usize,
    pub continue_on_error: bool,
    pub max_errors_to_retain: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        BackfillConfig {
            batch_size: 1_000,
            delay_between_batches_ms: 0,
            max_errors_before_pause: 100,
            continue_on_error: true,
            max_errors_to_retain: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackfillState {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillError {
    pub record_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillStatus {
    pub state: BackfillState,
    pub total_estimate: Option<u64>,
    pub processed_count: u64,
    pub error_count: u64,
    /// Serialized primary-key checkpoint of the last successfully copied row.
    pub last_processed_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub errors: Vec<BackfillError>,
}

impl BackfillStatus {
    pub fn new(now: DateTime<Utc>) -> Self {
        BackfillStatus {
            state: BackfillState::NotStarted,
            total_estimate: None,
            processed_count: 0,
            error_count: 0,
            last_processed_id: None,
            started_at: None,
            updated_at: now,
            completed_at: None,
            errors: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == BackfillState::Completed
    }

    /// `min(100, processed/total*100)` once a total is known and nonzero;
    /// `None` otherwise (total unknown, or the estimate failed).
    pub fn progress_percent(&self) -> Option<f64> {
        let total = self.total_estimate?;
        if total == 0 {
            return None;
        }
        let pct = (self.processed_count as f64 / total as f64) * 100.0;
        Some(pct.min(100.0))
    }

    /// Push a new error, trimming the oldest once `max_errors_to_retain` is
    /// exceeded so the status payload stays bounded regardless of how many
    /// rows actually failed.
    pub fn push_error(&mut self, error: BackfillError, max_errors_to_retain: usize) {
        self.errors.push(error);
        if self.errors.len() > max_errors_to_retain {
            let overflow = self.errors.len() - max_errors_to_retain;
            self.errors.drain(0..overflow);
        }
    }
}
