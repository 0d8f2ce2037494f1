//! World resources: the league, the clock and per-tick scratch.

use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_ai::profiles::lookup;
use sim_ai::{DecisionPolicy, TeamView};
use sim_core::config::SeasonConfig;
use sim_core::{
    Control, EntityId, EntityStore, LeagueConfig, SimError, SimEvent, Team, TeamName, Tendencies,
};
use sim_econ::{Action, Ledger};

use crate::history::SeasonSummary;
use crate::race::RaceResult;
use crate::standings::{rank, ChampionshipEntry};

/// Running totals for the current season.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonTally {
    pub points: u32,
    pub wins: u32,
    pub podiums: u32,
    pub races: u32,
    pub dnfs: u32,
    pub forfeits: u32,
    pub prize: Decimal,
    /// Results of each driver the team fielded this season.
    pub drivers: BTreeMap<EntityId, DriverTally>,
}

/// One driver's season for one team.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverTally {
    pub races: u32,
    pub wins: u32,
    pub podiums: u32,
    pub points: u32,
}

/// A team together with its money and standing state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamState {
    pub team: Team,
    pub ledger: Ledger,
    /// Strength tier the team was seeded with.
    pub tier: u8,
    /// Race scores in [0, 1], oldest first. Forfeits and retirements score 0.
    pub results: Vec<f32>,
    /// Cached standing metric; rewritten whenever its inputs change.
    pub standing: f32,
    /// `(tick, standing)` after every recompute.
    pub standing_history: Vec<(u64, f32)>,
    pub season: SeasonTally,
    /// Consecutive ticks spent below the insolvency floor.
    pub insolvent_ticks: u32,
    /// A bankruptcy warning is outstanding.
    pub warned: bool,
}

impl TeamState {
    pub fn new(team: Team, ledger: Ledger, tier: u8) -> Self {
        Self {
            team,
            ledger,
            tier,
            results: Vec::new(),
            standing: 0.0,
            standing_history: Vec::new(),
            season: SeasonTally::default(),
            insolvent_ticks: 0,
            warned: false,
        }
    }

    pub fn name(&self) -> &TeamName {
        &self.team.name
    }

    pub fn is_active(&self) -> bool {
        self.team.is_active()
    }
}

/// The authoritative league state.
#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
pub struct League {
    pub config: LeagueConfig,
    pub entities: EntityStore,
    pub teams: BTreeMap<TeamName, TeamState>,
    pub policy: DecisionPolicy,
}

impl League {
    pub fn team(&self, name: &TeamName) -> Result<&TeamState, SimError> {
        self.teams
            .get(name)
            .ok_or_else(|| SimError::UnknownTeam(name.to_string()))
    }

    pub fn team_mut(&mut self, name: &TeamName) -> Result<&mut TeamState, SimError> {
        self.teams
            .get_mut(name)
            .ok_or_else(|| SimError::UnknownTeam(name.to_string()))
    }

    pub fn ticks_per_season(&self) -> u64 {
        self.config.season.ticks_per_season()
    }

    /// Tendencies that drive a team. Human teams advised by the AI use the
    /// default vector.
    pub fn tendencies_for(&self, team: &Team) -> Tendencies {
        match &team.control {
            Control::Ai { profile } => lookup(&self.config.principals, profile)
                .copied()
                .unwrap_or_default(),
            Control::Human => Tendencies::default(),
        }
    }

    /// Payroll plus operating costs for one season.
    pub fn committed_per_season(&self, team: &Team) -> Decimal {
        let payroll: Decimal = self
            .entities
            .on_team(&team.name)
            .map(|e| e.salary)
            .sum();
        payroll + self.config.economy.operating_cost * Decimal::from(self.ticks_per_season())
    }

    /// Read-only view handed to the AI.
    pub fn view<'a>(&'a self, state: &'a TeamState) -> TeamView<'a> {
        TeamView {
            team: &state.team,
            entities: &self.entities,
            ledger: &state.ledger,
            requirements: &self.config.market.requirements,
            standings: &self.config.standings,
            costs: &self.config.actions,
            committed_per_season: self.committed_per_season(&state.team),
        }
    }

    /// Teams still competing, in name order.
    pub fn active_teams(&self) -> impl Iterator<Item = &TeamState> {
        self.teams.values().filter(|t| t.is_active())
    }

    /// Current season's championship table. Withdrawn teams keep their line
    /// once they have raced.
    pub fn championship_table(&self) -> Vec<ChampionshipEntry> {
        rank(
            self.teams
                .values()
                .filter(|t| t.is_active() || t.season.races > 0)
                .map(|t| ChampionshipEntry {
                    team: t.name().clone(),
                    points: t.season.points,
                    wins: t.season.wins,
                    podiums: t.season.podiums,
                    races: t.season.races,
                })
                .collect(),
        )
    }
}

/// Simulation time.
#[derive(Resource, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Ticks completed.
    pub tick: u64,
    pub season: u32,
    /// Position within the season, 1-based once the season has started.
    pub tick_in_season: u64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            tick: 0,
            season: 1,
            tick_in_season: 0,
        }
    }
}

impl Clock {
    /// Step to the next tick, rolling into a new season after the finale.
    pub fn advance(&mut self, ticks_per_season: u64) {
        if self.tick_in_season >= ticks_per_season.max(1) {
            self.season += 1;
            self.tick_in_season = 0;
        }
        self.tick += 1;
        self.tick_in_season += 1;
    }

    /// Race number held on this tick, if any.
    pub fn race_number(&self, cfg: &SeasonConfig) -> Option<u32> {
        let every = cfg.ticks_between_races.max(1) as u64;
        (self.tick_in_season > 0 && self.tick_in_season % every == 0)
            .then(|| (self.tick_in_season / every) as u32)
    }

    pub fn is_season_finale(&self, ticks_per_season: u64) -> bool {
        self.tick_in_season > 0 && self.tick_in_season == ticks_per_season
    }

    /// Season that contracts signed now start in.
    pub fn contract_season(&self, ticks_per_season: u64) -> u32 {
        if self.is_season_finale(ticks_per_season) {
            self.season + 1
        } else {
            self.season
        }
    }

    /// In-game date of the current tick.
    pub fn date(&self, cfg: &SeasonConfig) -> Option<NaiveDate> {
        cfg.start_date
            .checked_add_days(Days::new(self.tick * cfg.days_per_tick as u64))
    }
}

/// AI decision taken this tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub team: TeamName,
    pub action: Action,
    pub utility: f32,
    pub applied: bool,
}

/// State produced and consumed within a single tick.
#[derive(Resource, Debug, Default)]
pub struct TickScratch {
    pub race: Option<RaceResult>,
    /// Events awaiting publication, in creation order.
    pub drafts: Vec<SimEvent>,
    /// Race form per team in [-0.5, 0.5].
    pub forms: BTreeMap<TeamName, f32>,
    pub decisions: Vec<DecisionRecord>,
    pub season_summary: Option<SeasonSummary>,
    /// Sequence numbers assigned when the drafts were published.
    pub published: Vec<u64>,
}
