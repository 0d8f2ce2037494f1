//! Race resolution.
//!
//! Pure and deterministic: the same entrants, configuration and root seed
//! always produce the same grid, classification, points and prize money.
//! Entrants are processed in team-name order, so the order they are passed
//! in never matters.

use std::cmp::Ordering;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::config::{RaceConfig, ScoringConfig};
use sim_core::records::{FinishStatus, RaceResultRow};
use sim_core::{stream_rng, Capabilities, EntityId, EntityStore, Role, Stream, Team, TeamName, RATING_MIN};

/// Aggregated capabilities of one team's race entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entrant {
    pub team: TeamName,
    pub driver: EntityId,
    pub driver_name: String,
    pub pace: f32,
    pub consistency: f32,
    pub racecraft: f32,
    pub qualifying: f32,
    pub car_performance: f32,
    pub car_reliability: f32,
    /// Mean of engineer setup, mechanic pit work and strategist calls; an
    /// empty seat counts as the rating minimum.
    pub crew: f32,
    /// Mechanic reliability preparation.
    pub crew_reliability: f32,
}

impl Entrant {
    /// Build the entry for a team, or `None` when it has no active driver.
    pub fn from_team(team: &Team, store: &EntityStore) -> Option<Self> {
        let driver = team.fielded_driver(store)?;
        let Capabilities::Driver {
            pace,
            consistency,
            racecraft,
            qualifying,
        } = driver.capabilities()
        else {
            return None;
        };
        let (car_performance, car_reliability) = match team.best_capabilities(store, Role::Car) {
            Some(Capabilities::Car {
                performance,
                reliability,
            }) => (performance, reliability),
            _ => (RATING_MIN, RATING_MIN),
        };
        let setup = match team.best_capabilities(store, Role::Engineer) {
            Some(Capabilities::Engineer { setup_bonus, .. }) => setup_bonus,
            _ => RATING_MIN,
        };
        let (pit, crew_reliability) = match team.best_capabilities(store, Role::Mechanic) {
            Some(Capabilities::Mechanic {
                pit_efficiency,
                reliability_prep,
            }) => (pit_efficiency, reliability_prep),
            _ => (RATING_MIN, RATING_MIN),
        };
        let strategy = match team.best_capabilities(store, Role::Strategist) {
            Some(Capabilities::Strategist { strategy }) => strategy,
            _ => RATING_MIN,
        };
        Some(Self {
            team: team.name.clone(),
            driver: driver.id,
            driver_name: driver.name.clone(),
            pace,
            consistency,
            racecraft,
            qualifying,
            car_performance,
            car_reliability,
            crew: (setup + pit + strategy) / 3.0,
            crew_reliability,
        })
    }
}

/// A scheduled race and the teams taking part.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceInput {
    pub season: u32,
    pub race_number: u32,
    pub tick: u64,
    pub track: String,
    pub entrants: Vec<Entrant>,
    /// Teams with no fielded driver.
    pub forfeits: Vec<TeamName>,
}

/// One classified entrant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub team: TeamName,
    pub driver: EntityId,
    pub driver_name: String,
    pub grid_position: u32,
    pub finish_position: u32,
    pub status: FinishStatus,
    pub points: u32,
    pub prize: Decimal,
    pub performance: f32,
    /// Consistency and pace carried for tie-breaks and reporting.
    pub consistency: f32,
    pub pace: f32,
}

impl Classification {
    pub fn finished(&self) -> bool {
        self.status == FinishStatus::Finished
    }

    pub fn is_win(&self) -> bool {
        self.finished() && self.finish_position == 1
    }

    pub fn is_podium(&self) -> bool {
        self.finished() && self.finish_position <= 3
    }
}

/// Outcome of a race.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub season: u32,
    pub race_number: u32,
    pub tick: u64,
    pub track: String,
    /// Finishing order: finishers first, then retirements.
    pub classification: Vec<Classification>,
    pub forfeits: Vec<TeamName>,
}

impl RaceResult {
    pub fn winner(&self) -> Option<&Classification> {
        self.classification.first().filter(|c| c.finished())
    }

    pub fn for_team(&self, team: &TeamName) -> Option<&Classification> {
        self.classification.iter().find(|c| &c.team == team)
    }

    pub fn field_size(&self) -> u32 {
        self.classification.len() as u32
    }

    /// `race_results` rows in finishing order.
    pub fn rows(&self) -> Vec<RaceResultRow> {
        self.classification
            .iter()
            .map(|c| RaceResultRow {
                season: self.season,
                race_number: self.race_number,
                tick: self.tick,
                track_name: self.track.clone(),
                team_name: c.team.0.clone(),
                driver_name: c.driver_name.clone(),
                grid_position: c.grid_position,
                finish_position: c.finish_position,
                points_earned: c.points,
                status: c.status,
            })
            .collect()
    }
}

fn normalised(parts: &[(f32, f32)]) -> f32 {
    let total: f32 = parts.iter().map(|(w, _)| *w).sum();
    if total <= 0.0 {
        return RATING_MIN;
    }
    parts.iter().map(|(w, v)| w * v).sum::<f32>() / total
}

/// Driver component of the performance formula.
pub fn driver_score(e: &Entrant, cfg: &RaceConfig) -> f32 {
    normalised(&[
        (cfg.pace_weight, e.pace),
        (cfg.consistency_weight, e.consistency),
        (cfg.racecraft_weight, e.racecraft),
    ])
}

/// Performance before the random perturbation.
pub fn base_performance(e: &Entrant, cfg: &RaceConfig) -> f32 {
    normalised(&[
        (cfg.driver_weight, driver_score(e, cfg)),
        (cfg.car_weight, e.car_performance),
        (cfg.crew_weight, e.crew),
    ])
}

/// Perturbation amplitude; steadier drivers vary less.
pub fn perturbation_amplitude(e: &Entrant, cfg: &RaceConfig) -> f32 {
    cfg.perturbation * (1.5 - e.consistency / 100.0)
}

/// Probability of retiring, falling with car and crew reliability.
pub fn dnf_chance(e: &Entrant, cfg: &RaceConfig) -> f32 {
    let reliability = (e.car_reliability + e.crew_reliability) / 2.0;
    (cfg.dnf_base_chance * (2.0 - reliability / 50.0)).clamp(0.0, 1.0)
}

fn grid_score(e: &Entrant, cfg: &RaceConfig) -> f32 {
    normalised(&[
        (cfg.driver_weight, e.qualifying),
        (cfg.car_weight, e.car_performance),
    ])
}

/// Documented precedence: higher score, then higher consistency, then higher
/// pace, then team name ascending.
fn precedence(a: (f32, &Entrant), b: (f32, &Entrant)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.consistency.total_cmp(&a.1.consistency))
        .then_with(|| b.1.pace.total_cmp(&a.1.pace))
        .then_with(|| a.1.team.cmp(&b.1.team))
}

/// Resolve a race: qualifying, performance draws, retirements, then points
/// and prize money by finishing position.
pub fn resolve_race(
    input: &RaceInput,
    race: &RaceConfig,
    scoring: &ScoringConfig,
    seed: u64,
) -> RaceResult {
    let mut entrants: Vec<&Entrant> = input.entrants.iter().collect();
    entrants.sort_by(|a, b| a.team.cmp(&b.team));

    let mut quali_rng = stream_rng(seed, input.season, input.tick, Stream::Qualifying);
    let mut grid: Vec<(f32, &Entrant)> = entrants
        .iter()
        .map(|e| {
            let u: f32 = quali_rng.gen_range(-1.0..=1.0);
            (grid_score(e, race) + u * race.perturbation * 0.5, *e)
        })
        .collect();
    grid.sort_by(|a, b| precedence(*a, *b));
    let grid_position = |team: &TeamName| {
        grid.iter()
            .position(|(_, e)| &e.team == team)
            .map(|p| p as u32 + 1)
            .unwrap_or(0)
    };

    let mut race_rng = stream_rng(seed, input.season, input.tick, Stream::Race);
    let mut finishers: Vec<(f32, &Entrant)> = Vec::new();
    let mut retired: Vec<(f32, &Entrant)> = Vec::new();
    for e in &entrants {
        let u: f32 = race_rng.gen_range(-1.0..=1.0);
        let roll: f32 = race_rng.gen();
        let performance = base_performance(e, race) + u * perturbation_amplitude(e, race);
        if roll < dnf_chance(e, race) {
            retired.push((performance, *e));
        } else {
            finishers.push((performance, *e));
        }
    }
    finishers.sort_by(|a, b| precedence(*a, *b));
    retired.sort_by(|a, b| precedence(*a, *b));

    let classification = finishers
        .iter()
        .map(|f| (f, FinishStatus::Finished))
        .chain(retired.iter().map(|r| (r, FinishStatus::Dnf)))
        .enumerate()
        .map(|(i, ((performance, e), status))| {
            let position = i as u32 + 1;
            let finished = status == FinishStatus::Finished;
            Classification {
                team: e.team.clone(),
                driver: e.driver,
                driver_name: e.driver_name.clone(),
                grid_position: grid_position(&e.team),
                finish_position: position,
                status,
                points: if finished { scoring.points_for(position) } else { 0 },
                prize: if finished {
                    scoring.prize_for(position)
                } else {
                    Decimal::ZERO
                },
                performance: *performance,
                consistency: e.consistency,
                pace: e.pace,
            }
        })
        .collect();

    let mut forfeits = input.forfeits.clone();
    forfeits.sort();
    RaceResult {
        season: input.season,
        race_number: input.race_number,
        tick: input.tick,
        track: input.track.clone(),
        classification,
        forfeits,
    }
}
