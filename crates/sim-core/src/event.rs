//! Simulation event schema shared with observers.
//!
//! Events are drafted by the engine and the history tracker, sequenced once by
//! the bus on publication and never mutated afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, TeamName};

/// Kinds of published state changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEventKind {
    RaceResult,
    Transfer,
    Forfeit,
    Milestone,
    SeasonEnd,
    BankruptcyWarning,
    Insolvency,
    StreakEnded,
    Retirement,
    ActionApplied,
}

impl SimEventKind {
    pub const ALL: [SimEventKind; 10] = [
        SimEventKind::RaceResult,
        SimEventKind::Transfer,
        SimEventKind::Forfeit,
        SimEventKind::Milestone,
        SimEventKind::SeasonEnd,
        SimEventKind::BankruptcyWarning,
        SimEventKind::Insolvency,
        SimEventKind::StreakEnded,
        SimEventKind::Retirement,
        SimEventKind::ActionApplied,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SimEventKind::RaceResult => "race_result",
            SimEventKind::Transfer => "transfer",
            SimEventKind::Forfeit => "forfeit",
            SimEventKind::Milestone => "milestone",
            SimEventKind::SeasonEnd => "season_end",
            SimEventKind::BankruptcyWarning => "bankruptcy_warning",
            SimEventKind::Insolvency => "insolvency",
            SimEventKind::StreakEnded => "streak_ended",
            SimEventKind::Retirement => "retirement",
            SimEventKind::ActionApplied => "action_applied",
        }
    }
}

/// Immutable record of a state change.
///
/// `narration_hint` is only present when the event should prompt spoken
/// output; narration layers stay silent otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Position in the bus log; assigned on publish.
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: SimEventKind,
    pub tick: u64,
    pub season: u32,
    pub teams: Vec<TeamName>,
    pub entities: Vec<EntityId>,
    pub title: String,
    pub body: String,
    pub angle: String,
    pub why: String,
    pub payload: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_hint: Option<String>,
}

impl SimEvent {
    /// Start a draft; `seq` is filled in by the bus.
    pub fn new(kind: SimEventKind, tick: u64, season: u32) -> Self {
        Self {
            seq: 0,
            kind,
            tick,
            season,
            teams: Vec::new(),
            entities: Vec::new(),
            title: String::new(),
            body: String::new(),
            angle: String::new(),
            why: String::new(),
            payload: BTreeMap::new(),
            narration_hint: None,
        }
    }

    pub fn team(mut self, team: &TeamName) -> Self {
        self.teams.push(team.clone());
        self
    }

    pub fn entity(mut self, id: EntityId) -> Self {
        self.entities.push(id);
        self
    }

    pub fn title(mut self, s: impl Into<String>) -> Self {
        self.title = s.into();
        self
    }

    pub fn body(mut self, s: impl Into<String>) -> Self {
        self.body = s.into();
        self
    }

    pub fn angle(mut self, s: impl Into<String>) -> Self {
        self.angle = s.into();
        self
    }

    pub fn why(mut self, s: impl Into<String>) -> Self {
        self.why = s.into();
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn narrate(mut self, hint: impl Into<String>) -> Self {
        self.narration_hint = Some(hint.into());
        self
    }

    pub fn is_narratable(&self) -> bool {
        self.narration_hint.is_some()
    }

    pub fn involves(&self, team: &TeamName) -> bool {
        self.teams.iter().any(|t| t == team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_schema_uses_type_key_and_omits_silent_hint() {
        let ev = SimEvent::new(SimEventKind::Transfer, 7, 1)
            .team(&TeamName::from("Apex Racing"))
            .title("Signing")
            .with("fee", 1200);
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "transfer");
        assert_eq!(v["payload"]["fee"], 1200);
        assert!(v.get("narration_hint").is_none());

        let loud = ev.narrate("Big news from the paddock");
        assert!(loud.is_narratable());
        let v = serde_json::to_value(&loud).unwrap();
        assert_eq!(v["narration_hint"], "Big news from the paddock");
    }

    #[test]
    fn kind_names_match_serde() {
        for k in SimEventKind::ALL {
            let v = serde_json::to_value(k).unwrap();
            assert_eq!(v, k.as_str());
        }
    }
}
