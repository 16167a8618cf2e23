use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The migration lifecycle of a single entity (or the process-wide default).
///
/// Totally ordered in the sense that operators are expected to advance
/// monotonically `SourceOnly -> DualWriteReadSource -> DualWriteReadTarget ->
/// TargetOnly`, but nothing in this type or its consumers enforces that —
/// rolling back to an earlier phase is a legal (if unusual) transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    SourceOnly,
    DualWriteReadSource,
    DualWriteReadTarget,
    TargetOnly,
}

/// Which engine a write/read is routed to for a given phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Source,
    Target,
}

/// The dispatch decision a [`Phase`] implies for one write: which engine sees
/// it first (and whose result the caller receives), and which engine (if
/// any) gets the fire-and-forget secondary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRoute {
    pub primary: Engine,
    pub secondary: Option<Engine>,
}

impl Phase {
    /// The engine that serves reads in this phase.
    pub fn read_engine(self) -> Engine {
        match self {
            Phase::SourceOnly | Phase::DualWriteReadSource => Engine::Source,
            Phase::DualWriteReadTarget | Phase::TargetOnly => Engine::Target,
        }
    }

    /// The primary/secondary engine split for a write in this phase, per
    /// spec §4.2's routing table.
    pub fn write_route(self) -> WriteRoute {
        match self {
            Phase::SourceOnly => WriteRoute {
                primary: Engine::Source,
                secondary: None,
            },
            Phase::DualWriteReadSource => WriteRoute {
                primary: Engine::Source,
                secondary: Some(Engine::Target),
            },
            Phase::DualWriteReadTarget => WriteRoute {
                primary: Engine::Target,
                secondary: Some(Engine::Source),
            },
            Phase::TargetOnly => WriteRoute {
                primary: Engine::Target,
                secondary: None,
            },
        }
    }

    pub fn is_dual_write(self) -> bool {
        matches!(self, Phase::DualWriteReadSource | Phase::DualWriteReadTarget)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::SourceOnly => "SOURCE_ONLY",
            Phase::DualWriteReadSource => "DUAL_WRITE_READ_SOURCE",
            Phase::DualWriteReadTarget => "DUAL_WRITE_READ_TARGET",
            Phase::TargetOnly => "TARGET_ONLY",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown migration phase: {0}")]
pub struct ParsePhaseError(pub String);

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOURCE_ONLY" => Ok(Phase::SourceOnly),
            "DUAL_WRITE_READ_SOURCE" => Ok(Phase::DualWriteReadSource),
            "DUAL_WRITE_READ_TARGET" => Ok(Phase::DualWriteReadTarget),
            "TARGET_ONLY" => Ok(Phase::TargetOnly),
            other => Err(ParsePhaseError(other.to_string())),
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::SourceOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_source_only() {
        let route = Phase::SourceOnly.write_route();
        assert_eq!(route.primary, Engine::Source);
        assert_eq!(route.secondary, None);
        assert_eq!(Phase::SourceOnly.read_engine(), Engine::Source);
    }

    #[test]
    fn routes_dual_write_read_target() {
        let route = Phase::DualWriteReadTarget.write_route();
        assert_eq!(route.primary, Engine::Target);
        assert_eq!(route.secondary, Some(Engine::Source));
        assert_eq!(Phase::DualWriteReadTarget.read_engine(), Engine::Target);
    }

    #[test]
    fn parses_round_trip() {
        for phase in [
            Phase::SourceOnly,
            Phase::DualWriteReadSource,
            Phase::DualWriteReadTarget,
            Phase::TargetOnly,
        ] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("bogus".parse::<Phase>().is_err());
    }
}
