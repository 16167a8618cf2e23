use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncVerificationResult {
    pub table_name: String,
    pub source_count: u64,
    pub target_count: u64,
    pub sampled_records: usize,
    pub matching_records: usize,
    pub missing_in_target: usize,
    pub different_in_target: usize,
    pub verified_at: DateTime<Utc>,
}

impl SyncVerificationResult {
    pub fn counts_match(&self) -> bool {
        self.source_count == self.target_count
    }

    pub fn in_sync(&self) -> bool {
        self.counts_match() && self.missing_in_target == 0 && self.different_in_target == 0
    }

    /// `matching/sampled*100`, or 100 when nothing was sampled — an empty
    /// sample is vacuously in agreement, not a verification failure.
    pub fn match_percent(&self) -> f64 {
        if self.sampled_records == 0 {
            100.0
        } else {
            (self.matching_records as f64 / self.sampled_records as f64) * 100.0
        }
    }
}
