use model::Phase;
use std::{collections::HashMap, sync::RwLock};

/// Process-wide default phase plus per-entity overrides (spec §3).
///
/// Reads never block on writes for long: both maps are plain
/// `std::sync::RwLock`s held only for the duration of a single lookup or
/// mutation, never across an `.await`.
pub struct PhaseRegistry {
    default_phase: RwLock<Phase>,
    overrides: RwLock<HashMap<String, Phase>>,
}

impl PhaseRegistry {
    pub fn new(default_phase: Phase) -> Self {
        PhaseRegistry {
            default_phase: RwLock::new(default_phase),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// I1: always defined — falls through to the default when no override
    /// is registered for `table_name`.
    pub fn phase_for(&self, table_name: &str) -> Phase {
        if let Some(phase) = self.overrides.read().unwrap().get(table_name) {
            return *phase;
        }
        *self.default_phase.read().unwrap()
    }

    pub fn default_phase(&self) -> Phase {
        *self.default_phase.read().unwrap()
    }

    pub fn set_default(&self, phase: Phase) {
        *self.default_phase.write().unwrap() = phase;
    }

    pub fn table_override(&self, table_name: &str) -> Option<Phase> {
        self.overrides.read().unwrap().get(table_name).copied()
    }

    pub fn set_table_override(&self, table_name: &str, phase: Phase) {
        self.overrides
            .write()
            .unwrap()
            .insert(table_name.to_string(), phase);
    }

    pub fn clear_table_override(&self, table_name: &str) {
        self.overrides.write().unwrap().remove(table_name);
    }
}

impl Default for PhaseRegistry {
    fn default() -> Self {
        PhaseRegistry::new(Phase::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_through_to_default() {
        let registry = PhaseRegistry::new(Phase::SourceOnly);
        assert_eq!(registry.phase_for("users"), Phase::SourceOnly);

        registry.set_table_override("users", Phase::TargetOnly);
        assert_eq!(registry.phase_for("users"), Phase::TargetOnly);
        assert_eq!(registry.phase_for("orders"), Phase::SourceOnly);

        registry.clear_table_override("users");
        assert_eq!(registry.phase_for("users"), Phase::SourceOnly);
    }
}
