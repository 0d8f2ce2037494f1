//! Historical tracker: streaks, pulse, career totals and milestones.
//!
//! The tracker is the only writer of the derived tables. It reads race
//! results and season summaries handed to it by the engine and never touches
//! primary state. Both hooks return event drafts; the engine publishes them
//! in the same tick.

use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::config::HistoryConfig;
use sim_core::records::{
    ActiveStreaks, CareerStatsRow, Momentum, SeasonSummaryRow, TeamCareerTotals, TeamPulse,
};
use sim_core::{EntityId, Role, SimEvent, SimEventKind, TeamName};
use tracing::{debug, info};

use crate::race::RaceResult;
use crate::standings::race_score;

/// One team's line in a completed season.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonStanding {
    pub team: TeamName,
    pub position: u32,
    pub points: u32,
    pub wins: u32,
    pub podiums: u32,
    pub races: u32,
    pub prize: Decimal,
}

/// One driver's season, as fielded by a team.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverSeason {
    pub entity: EntityId,
    pub name: String,
    pub team: TeamName,
    pub races: u32,
    pub wins: u32,
    pub podiums: u32,
    pub points: u32,
}

/// Rostered non-driver staff at season end; they share their team's line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaffSeason {
    pub entity: EntityId,
    pub name: String,
    pub role: Role,
    pub team: TeamName,
}

/// Final table of a season.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub season: u32,
    pub tick: u64,
    pub league_id: String,
    /// Championship order.
    pub standings: Vec<SeasonStanding>,
    pub drivers: Vec<DriverSeason>,
    #[serde(default)]
    pub staff: Vec<StaffSeason>,
}

impl SeasonSummary {
    pub fn champion(&self) -> Option<&SeasonStanding> {
        self.standings.iter().find(|s| s.position == 1)
    }

    /// Highest-scoring driver of a team this season; lowest id on ties.
    pub fn top_driver(&self, team: &TeamName) -> Option<&DriverSeason> {
        self.drivers
            .iter()
            .filter(|d| &d.team == team)
            .max_by(|a, b| a.points.cmp(&b.points).then_with(|| b.entity.cmp(&a.entity)))
    }

    pub fn rows(&self) -> Vec<SeasonSummaryRow> {
        self.standings
            .iter()
            .map(|s| SeasonSummaryRow {
                season: self.season,
                tick: self.tick,
                league_id: self.league_id.clone(),
                team_name: s.team.0.clone(),
                final_position: s.position,
                points: s.points,
                prize_money: s.prize,
            })
            .collect()
    }
}

/// A threshold a team crossed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub season: u32,
    pub tick: u64,
    pub team: TeamName,
    pub title: String,
}

/// Everything a commentator needs about one team.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContextPacket {
    pub team: TeamName,
    pub pulse: TeamPulse,
    pub streaks: ActiveStreaks,
    pub career: TeamCareerTotals,
    /// Newest first.
    pub recent_milestones: Vec<Milestone>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct RaceMark {
    win: bool,
    score: f32,
}

/// Derived historical state.
#[derive(Resource, Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistoricalTracker {
    config: HistoryConfig,
    streaks: BTreeMap<TeamName, ActiveStreaks>,
    marks: BTreeMap<TeamName, Vec<RaceMark>>,
    pulses: BTreeMap<TeamName, TeamPulse>,
    totals: BTreeMap<TeamName, TeamCareerTotals>,
    careers: BTreeMap<EntityId, CareerStatsRow>,
    processed_seasons: BTreeSet<u32>,
    milestones: BTreeMap<TeamName, Vec<Milestone>>,
}

enum StreakKind {
    Podium,
    Points,
    Dnf,
}

impl StreakKind {
    fn label(&self) -> &'static str {
        match self {
            StreakKind::Podium => "podium",
            StreakKind::Points => "points",
            StreakKind::Dnf => "retirement",
        }
    }
}

/// Extend a counter on a qualifying result, otherwise reset it. Returns the
/// length of the streak that just ended, if any.
fn step_counter(current: &mut u32, best: &mut u32, qualifies: bool) -> Option<u32> {
    if qualifies {
        *current += 1;
        *best = (*best).max(*current);
        None
    } else {
        let ended = *current;
        *current = 0;
        (ended > 0).then_some(ended)
    }
}

fn crossed(before: u32, after: u32, step: u32) -> Option<u32> {
    if step == 0 || after / step <= before / step {
        return None;
    }
    Some(after / step * step)
}

impl HistoricalTracker {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn streak_entry(&mut self, team: &TeamName) -> &mut ActiveStreaks {
        self.streaks
            .entry(team.clone())
            .or_insert_with(|| ActiveStreaks {
                team_name: team.0.clone(),
                ..ActiveStreaks::default()
            })
    }

    /// Update streaks and pulse for every team that took part in `race`.
    pub fn on_race_complete(&mut self, race: &RaceResult, max_points: u32) -> Vec<SimEvent> {
        let mut drafts = Vec::new();
        let mut outcomes: Vec<(TeamName, Option<(bool, bool, bool, bool, u32)>)> = race
            .classification
            .iter()
            .map(|c| {
                (
                    c.team.clone(),
                    Some((c.is_podium(), c.finished() && c.points > 0, !c.finished(), c.is_win(), c.points)),
                )
            })
            .collect();
        outcomes.extend(race.forfeits.iter().map(|t| (t.clone(), None)));

        for (team, outcome) in outcomes {
            // A forfeit breaks podium and points runs; it is not a retirement.
            let (podium, points, dnf, win, earned) = outcome.unwrap_or((false, false, false, false, 0));
            let forfeit = outcome.is_none();
            let s = self.streak_entry(&team);
            let mut ended = Vec::new();
            if let Some(n) = step_counter(&mut s.current_podiums, &mut s.best_podiums, podium) {
                ended.push((StreakKind::Podium, n));
            }
            if let Some(n) = step_counter(&mut s.current_points, &mut s.best_points, points) {
                ended.push((StreakKind::Points, n));
            }
            if !forfeit {
                if let Some(n) = step_counter(&mut s.current_dnfs, &mut s.longest_dnfs, dnf) {
                    ended.push((StreakKind::Dnf, n));
                }
            }
            for (kind, length) in ended.into_iter().filter(|(_, n)| *n >= 2) {
                info!(tick = race.tick, team = %team, streak = kind.label(), length, "streak ended");
                let mut ev = SimEvent::new(SimEventKind::StreakEnded, race.tick, race.season)
                    .team(&team)
                    .title(format!("{team}'s {} run ends at {length}", kind.label()))
                    .body(format!(
                        "{team} finished round {} at {} and the run of {length} is over.",
                        race.race_number, race.track
                    ))
                    .angle("form")
                    .why(format!("{} streak broken", kind.label()))
                    .with("streak", kind.label())
                    .with("length", length);
                if !matches!(kind, StreakKind::Dnf) && length >= 3 {
                    ev = ev.narrate(format!("{team}'s run of {length} {} finishes is over", kind.label()));
                }
                drafts.push(ev);
            }

            let marks = self.marks.entry(team.clone()).or_default();
            marks.push(RaceMark {
                win,
                score: race_score(earned, max_points),
            });
            let keep = self.config.pulse_window.max(1);
            if marks.len() > keep {
                let excess = marks.len() - keep;
                marks.drain(..excess);
            }
            self.recompute_pulse(&team, race.tick);
        }
        drafts
    }

    fn recompute_pulse(&mut self, team: &TeamName, tick: u64) {
        let marks = self.marks.get(team).cloned().unwrap_or_default();
        let streaks = self.streaks.get(team).cloned().unwrap_or_default();
        let cfg = &self.config;
        let n = marks.len();
        let win_rate = if n == 0 {
            0.0
        } else {
            marks.iter().filter(|m| m.win).count() as f32 / n as f32
        };
        let momentum_value = if n < 2 {
            0.0
        } else {
            let split = n / 2;
            let mean = |s: &[RaceMark]| s.iter().map(|m| m.score).sum::<f32>() / s.len() as f32;
            (mean(&marks[split..]) - mean(&marks[..split])).clamp(-1.0, 1.0)
        };
        let momentum = if momentum_value > 0.1 {
            Momentum::Rising
        } else if momentum_value < -0.1 {
            Momentum::Falling
        } else {
            Momentum::Steady
        };
        let cap = cfg.streak_cap.max(1) as f32;
        let positive = streaks.current_podiums.max(streaks.current_points) as f32;
        let streak_magnitude = ((positive - streaks.current_dnfs as f32) / cap).clamp(-1.0, 1.0);
        let weights = cfg.win_rate_weight + cfg.momentum_weight + cfg.streak_weight;
        let pulse = if weights <= 0.0 {
            0.0
        } else {
            100.0
                * (cfg.win_rate_weight * win_rate
                    + cfg.momentum_weight * (momentum_value + 1.0) / 2.0
                    + cfg.streak_weight * (streak_magnitude + 1.0) / 2.0)
                / weights
        };
        self.pulses.insert(
            team.clone(),
            TeamPulse {
                team_name: team.0.clone(),
                tick,
                pulse: pulse.clamp(0.0, 100.0),
                win_rate,
                momentum,
                momentum_value,
                streak_magnitude,
            },
        );
    }

    /// Fold a completed season into career totals and check milestones.
    /// A season already processed is ignored.
    pub fn on_season_end(&mut self, summary: &SeasonSummary) -> Vec<SimEvent> {
        if !self.processed_seasons.insert(summary.season) {
            debug!(season = summary.season, "season already folded into history");
            return Vec::new();
        }
        let mut reached: Vec<Milestone> = Vec::new();
        let step = (
            self.config.win_milestone_step,
            self.config.podium_milestone_step,
            self.config.race_milestone_step,
        );
        for s in &summary.standings {
            let totals = self
                .totals
                .entry(s.team.clone())
                .or_insert_with(|| TeamCareerTotals {
                    team_name: s.team.0.clone(),
                    ..TeamCareerTotals::default()
                });
            let before = totals.clone();
            totals.seasons += 1;
            totals.races += s.races;
            totals.wins += s.wins;
            totals.podiums += s.podiums;
            totals.points += s.points;
            if s.position == 1 {
                totals.championships += 1;
            }
            totals.best_finish = Some(totals.best_finish.map_or(s.position, |b| b.min(s.position)));
            if totals.peak_season.is_none() || s.points > totals.peak_season_points {
                totals.peak_season_points = s.points;
                totals.peak_season = Some(summary.season);
            }

            let mut titles = Vec::new();
            if before.championships == 0 && totals.championships == 1 {
                titles.push(format!("{} win their first championship", s.team));
            }
            if let Some(n) = crossed(before.wins, totals.wins, step.0) {
                titles.push(format!("{} reach {n} career wins", s.team));
            }
            if let Some(n) = crossed(before.podiums, totals.podiums, step.1) {
                titles.push(format!("{} reach {n} career podiums", s.team));
            }
            if let Some(n) = crossed(before.races, totals.races, step.2) {
                titles.push(format!("{} reach {n} career starts", s.team));
            }
            reached.extend(titles.into_iter().map(|title| Milestone {
                season: summary.season,
                tick: summary.tick,
                team: s.team.clone(),
                title,
            }));
        }

        let champion = summary.champion().map(|c| c.team.clone());
        let champion_driver = champion
            .as_ref()
            .and_then(|t| summary.top_driver(t))
            .map(|d| d.entity);
        for d in &summary.drivers {
            let career = self.career_entry(d.entity, &d.name, Role::Driver);
            career.races_participated += d.races;
            career.wins += d.wins;
            career.podiums += d.podiums;
            career.points_total += d.points;
            if Some(d.entity) == champion_driver {
                career.championships += 1;
            }
        }
        for staff in &summary.staff {
            let Some(line) = summary.standings.iter().find(|s| s.team == staff.team) else {
                continue;
            };
            let career = self.career_entry(staff.entity, &staff.name, staff.role);
            career.races_participated += line.races;
            career.wins += line.wins;
            career.podiums += line.podiums;
            career.points_total += line.points;
            if champion.as_ref() == Some(&staff.team) {
                career.championships += 1;
            }
        }

        let keep = self.config.recent_milestones.max(1);
        let mut drafts = Vec::with_capacity(reached.len());
        for m in reached {
            info!(season = m.season, team = %m.team, milestone = %m.title, "milestone");
            drafts.push(
                SimEvent::new(SimEventKind::Milestone, m.tick, m.season)
                    .team(&m.team)
                    .title(m.title.clone())
                    .body(format!("Season {} closes with a landmark: {}.", m.season, m.title))
                    .angle("history")
                    .why("career threshold crossed")
                    .narrate(m.title.clone()),
            );
            let list = self.milestones.entry(m.team.clone()).or_default();
            list.push(m);
            if list.len() > keep {
                let excess = list.len() - keep;
                list.drain(..excess);
            }
        }
        drafts
    }

    fn career_entry(&mut self, id: EntityId, name: &str, role: Role) -> &mut CareerStatsRow {
        self.careers.entry(id).or_insert_with(|| CareerStatsRow {
            entity_name: name.to_string(),
            role,
            races_participated: 0,
            wins: 0,
            podiums: 0,
            points_total: 0,
            championships: 0,
        })
    }

    pub fn has_processed(&self, season: u32) -> bool {
        self.processed_seasons.contains(&season)
    }

    /// Read-only summary for one team; empty parts for teams with no history.
    pub fn context_packet(&self, team: &TeamName) -> ContextPacket {
        ContextPacket {
            team: team.clone(),
            pulse: self.pulses.get(team).cloned().unwrap_or_else(|| TeamPulse {
                team_name: team.0.clone(),
                ..TeamPulse::default()
            }),
            streaks: self.streaks.get(team).cloned().unwrap_or_else(|| ActiveStreaks {
                team_name: team.0.clone(),
                ..ActiveStreaks::default()
            }),
            career: self.totals.get(team).cloned().unwrap_or_else(|| TeamCareerTotals {
                team_name: team.0.clone(),
                ..TeamCareerTotals::default()
            }),
            recent_milestones: self
                .milestones
                .get(team)
                .map(|m| m.iter().rev().cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn streaks(&self) -> impl Iterator<Item = &ActiveStreaks> {
        self.streaks.values()
    }

    pub fn pulses(&self) -> impl Iterator<Item = &TeamPulse> {
        self.pulses.values()
    }

    pub fn team_totals(&self) -> impl Iterator<Item = &TeamCareerTotals> {
        self.totals.values()
    }

    pub fn career_stats(&self) -> impl Iterator<Item = &CareerStatsRow> {
        self.careers.values()
    }
}
