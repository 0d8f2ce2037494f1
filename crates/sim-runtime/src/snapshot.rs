//! Whole-engine snapshots taken between ticks.

use persistence::{decode_snapshot, encode_snapshot, PersistenceError};
use serde::{Deserialize, Serialize};
use sim_core::SimEvent;

use crate::history::HistoricalTracker;
use crate::records::RecordBook;
use crate::state::{Clock, League};

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Primary state plus the published event log; enough to resume a league
/// exactly where it stopped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeagueSnapshot {
    pub format_version: u32,
    pub clock: Clock,
    pub league: League,
    pub tracker: HistoricalTracker,
    pub records: RecordBook,
    pub events: Vec<SimEvent>,
}

impl LeagueSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        encode_snapshot(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        decode_snapshot(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulationEngine;
    use sim_core::LeagueConfig;

    #[test]
    fn snapshot_bytes_restore_the_same_engine_state() {
        let mut engine = SimulationEngine::new(LeagueConfig::default()).unwrap();
        engine.run_ticks(5);
        let snap = engine.snapshot();
        let bytes = snap.to_bytes().unwrap();
        let back = LeagueSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(back.clock, snap.clock);
        assert_eq!(back.records, snap.records);
        assert_eq!(back.events, snap.events);
        assert_eq!(back.league.teams, snap.league.teams);
    }

    #[test]
    fn garbage_is_an_encoding_error() {
        assert!(matches!(
            LeagueSnapshot::from_bytes(b"not a snapshot"),
            Err(PersistenceError::Encode(_))
        ));
    }

    #[test]
    fn future_versions_are_refused() {
        let engine = SimulationEngine::new(LeagueConfig::default()).unwrap();
        let mut snap = engine.snapshot();
        snap.format_version = SNAPSHOT_VERSION + 1;
        assert!(SimulationEngine::from_snapshot(snap).is_err());
    }
}
