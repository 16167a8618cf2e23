use crate::{backfill::BackfillStatus, phase::Phase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTableStatus {
    pub table_name: String,
    pub current_phase: Phase,
    pub backfill_status: Option<BackfillStatus>,
}
