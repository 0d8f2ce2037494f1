//! Tick systems, run in a fixed chain by the engine schedule:
//! decisions, race, economy, growth, standings, history, publication.

use bevy_ecs::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use sim_ai::decide;
use sim_core::records::{ChampionshipStandingRow, TeamOutcomeRow};
use sim_core::{
    mix_seed, stream_rng, EntityId, Role, SimEvent, SimEventKind, Stream, TeamName, TeamStatus,
};
use sim_econ::{
    discretionary_actions, execute, per_tick, sponsorship_income, Action, ActionContext,
    ActionKind, TransactionKind,
};
use tracing::{debug, info, warn};

use crate::bus::SimEventBus;
use crate::engine::ActionOutcome;
use crate::growth::{car_drift, due_to_retire, person_deltas, race_form, visit_order};
use crate::history::{DriverSeason, HistoricalTracker, SeasonStanding, SeasonSummary, StaffSeason};
use crate::market::{hire_actions, negotiate, release_to_market};
use crate::race::{resolve_race, Entrant, RaceInput};
use crate::records::RecordBook;
use crate::setup::spawn_rookies;
use crate::standings::{race_score, standing};
use crate::state::{Clock, DecisionRecord, League, SeasonTally, TickScratch};
use crate::MarketError;

/// Route an action through the path shared by human and AI teams: hires
/// through the job market, everything else through the all-or-nothing
/// executor.
pub(crate) fn apply_action(
    league: &mut League,
    clock: &Clock,
    team: &TeamName,
    action: &Action,
) -> Result<ActionOutcome, MarketError> {
    if let ActionKind::Hire { entity, salary } = &action.kind {
        let (transfer, event) = negotiate(league, clock, team, *entity, *salary)?;
        return Ok(ActionOutcome {
            action: action.clone(),
            summary: format!("{} signs {}", team, transfer.name),
            transfer: Some(transfer),
            events: vec![event],
        });
    }
    let League {
        config,
        entities,
        teams,
        ..
    } = league;
    let state = teams
        .get_mut(team)
        .ok_or_else(|| sim_core::SimError::UnknownTeam(team.to_string()))?;
    let receipt = execute(
        action,
        ActionContext {
            tick: clock.tick,
            season: clock.season,
            team: &mut state.team,
            ledger: &mut state.ledger,
            entities,
            costs: &config.actions,
        },
    )?;
    let mut events = Vec::new();
    if !action.is_noop() {
        let mut event = SimEvent::new(SimEventKind::ActionApplied, clock.tick, clock.season)
            .team(team)
            .title(receipt.summary.clone())
            .body(format!("{} for {}.", receipt.summary, action.cost))
            .angle("operations")
            .why(format!("{team} chose to {}", action.label().replace('_', " ")))
            .with("action", action.label())
            .with("cost", action.cost.to_string());
        match &action.kind {
            ActionKind::TrainDriver { driver: id } | ActionKind::Release { entity: id } => {
                event = event.entity(*id);
            }
            _ => {}
        }
        events.push(event);
    }
    Ok(ActionOutcome {
        action: action.clone(),
        summary: receipt.summary,
        transfer: None,
        events,
    })
}

pub(crate) fn begin_tick(
    mut clock: ResMut<Clock>,
    league: Res<League>,
    mut scratch: ResMut<TickScratch>,
) {
    clock.advance(league.ticks_per_season());
    *scratch = TickScratch::default();
    debug!(tick = clock.tick, season = clock.season, "tick started");
}

/// Each active AI team picks one action from the shared catalogue.
pub(crate) fn principal_decisions(
    clock: Res<Clock>,
    mut league: ResMut<League>,
    mut records: ResMut<RecordBook>,
    mut scratch: ResMut<TickScratch>,
) {
    let names: Vec<TeamName> = league
        .active_teams()
        .filter(|s| s.team.control.is_ai())
        .map(|s| s.name().clone())
        .collect();
    for name in names {
        let Ok(state) = league.team(&name) else {
            continue;
        };
        let mut catalogue =
            discretionary_actions(&state.team, &league.entities, &league.config.actions);
        catalogue.extend(hire_actions(&league, &name));
        let tendencies = league.tendencies_for(&state.team);
        let decision = decide(&league.view(state), &catalogue, &tendencies, &league.policy);

        let (applied, summary) = match apply_action(&mut league, &clock, &name, &decision.action) {
            Ok(outcome) => {
                scratch.drafts.extend(outcome.events);
                (true, outcome.summary)
            }
            Err(e) => {
                warn!(tick = clock.tick, team = %name, action = decision.action.label(), error = %e, "ai action failed");
                (false, e.to_string())
            }
        };
        records.push_outcome(TeamOutcomeRow {
            tick: clock.tick,
            season: clock.season,
            team_name: name.0.clone(),
            decision_type: decision.action.label().to_string(),
            outcome_data: json!({
                "action": decision.action,
                "scores": decision.scores,
                "considered": decision.considered,
                "applied": applied,
                "summary": summary,
            })
            .to_string(),
            result_score: decision.utility,
        });
        scratch.decisions.push(DecisionRecord {
            team: name,
            action: decision.action,
            utility: decision.utility,
            applied,
        });
    }
}

/// Run the scheduled race, if any. Teams without a driver forfeit.
pub(crate) fn run_race(
    clock: Res<Clock>,
    league: Res<League>,
    mut records: ResMut<RecordBook>,
    mut scratch: ResMut<TickScratch>,
) {
    let season_cfg = &league.config.season;
    let Some(race_number) = clock.race_number(season_cfg) else {
        return;
    };
    let tracks = &season_cfg.tracks;
    let track = tracks
        .get((race_number as usize - 1) % tracks.len().max(1))
        .cloned()
        .unwrap_or_else(|| format!("Round {race_number}"));

    let mut entrants = Vec::new();
    let mut forfeits = Vec::new();
    for state in league.active_teams() {
        match Entrant::from_team(&state.team, &league.entities) {
            Some(e) => entrants.push(e),
            None => forfeits.push(state.name().clone()),
        }
    }
    let input = RaceInput {
        season: clock.season,
        race_number,
        tick: clock.tick,
        track: track.clone(),
        entrants,
        forfeits,
    };
    let result = resolve_race(
        &input,
        &league.config.race,
        &league.config.scoring,
        league.config.seed,
    );

    for team in &result.forfeits {
        warn!(tick = clock.tick, team = %team, %track, "no driver available, race forfeited");
        scratch.drafts.push(
            SimEvent::new(SimEventKind::Forfeit, clock.tick, clock.season)
                .team(team)
                .title(format!("{team} forfeit at {track}"))
                .body(format!("{team} could not field a driver for round {race_number} and score nothing."))
                .angle("paddock")
                .why(format!("{team} had no active driver on the roster"))
                .with("race_number", race_number)
                .with("track", track.as_str())
                .narrate(format!("{team} miss the race at {track}")),
        );
        scratch.forms.insert(team.clone(), race_form(0, 0, false));
    }

    let field = result.field_size();
    for c in &result.classification {
        scratch
            .forms
            .insert(c.team.clone(), race_form(c.finish_position, field, c.finished()));
    }

    let order: Vec<&str> = result.classification.iter().map(|c| c.team.as_str()).collect();
    let mut event = SimEvent::new(SimEventKind::RaceResult, clock.tick, clock.season)
        .title(format!("Round {race_number} at {track}"))
        .angle("race")
        .with("race_number", race_number)
        .with("track", track.as_str())
        .with("order", json!(order));
    for c in &result.classification {
        event = event.team(&c.team).entity(c.driver);
    }
    if let Some(w) = result.winner() {
        event = event
            .body(format!("{} wins at {track} for {}.", w.driver_name, w.team))
            .why(format!("{} had the strongest race pace on the day", w.team))
            .with("winner", w.team.as_str())
            .narrate(format!("{} takes victory at {track}", w.driver_name));
    } else {
        event = event
            .body(format!("Nobody saw the flag at {track}."))
            .why("every entrant retired".to_string());
    }
    scratch.drafts.push(event);

    info!(
        tick = clock.tick,
        season = clock.season,
        race_number,
        %track,
        winner = result.winner().map(|w| w.team.as_str()).unwrap_or("none"),
        "race resolved"
    );
    records.push_race(result.rows());
    scratch.race = Some(result);
}

/// Prize money, fines, sponsorship, payroll, operating costs and the
/// bankruptcy pipeline.
pub(crate) fn settle_economy(
    clock: Res<Clock>,
    mut league: ResMut<League>,
    mut scratch: ResMut<TickScratch>,
) {
    let (tick, season) = (clock.tick, clock.season);
    let tps = league.ticks_per_season();
    let names: Vec<TeamName> = league.active_teams().map(|s| s.name().clone()).collect();
    let mut withdrawn: Vec<TeamName> = Vec::new();
    {
        let League {
            config,
            entities,
            teams,
            ..
        } = &mut *league;
        let econ = &config.economy;
        for (idx, name) in names.iter().enumerate() {
            let Some(state) = teams.get_mut(name) else {
                continue;
            };
            if let Some(race) = &scratch.race {
                if let Some(c) = race.for_team(name) {
                    if c.prize > Decimal::ZERO {
                        let desc = format!("P{} at {}", c.finish_position, race.track);
                        if let Err(e) = state.ledger.credit(tick, season, TransactionKind::PrizeMoney, c.prize, desc) {
                            warn!(tick, team = %name, error = %e, "prize not credited");
                        } else {
                            state.season.prize += c.prize;
                        }
                    }
                }
                if race.forfeits.contains(name) && config.scoring.forfeit_fine > Decimal::ZERO {
                    let desc = format!("forfeit fine, round {}", race.race_number);
                    if let Err(e) = state.ledger.debit(tick, season, TransactionKind::ForfeitFine, config.scoring.forfeit_fine, desc) {
                        warn!(tick, team = %name, error = %e, "forfeit fine not collected");
                    }
                }
            }

            let seed = mix_seed(
                config.seed,
                season,
                tick,
                ((Stream::Sponsorship as u64) << 32) | idx as u64,
            );
            match sponsorship_income(econ.sponsorship_base, state.standing, econ.sponsorship_noise, seed) {
                Ok(amount) if amount > Decimal::ZERO => {
                    if let Err(e) = state.ledger.credit(tick, season, TransactionKind::Sponsorship, amount, "sponsorship") {
                        warn!(tick, team = %name, error = %e, "sponsorship not credited");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(tick, team = %name, error = %e, "sponsorship skipped"),
            }

            let salaries: Decimal = entities.on_team(name).map(|e| e.salary).sum();
            let payroll = per_tick(salaries, tps);
            if payroll > Decimal::ZERO {
                if let Err(e) = state.ledger.debit(tick, season, TransactionKind::Payroll, payroll, "payroll") {
                    warn!(tick, team = %name, error = %e, "payroll not paid");
                }
            }
            if econ.operating_cost > Decimal::ZERO {
                if let Err(e) = state.ledger.debit(tick, season, TransactionKind::Operating, econ.operating_cost, "operating costs") {
                    warn!(tick, team = %name, error = %e, "operating costs not paid");
                }
            }

            let balance = state.ledger.balance();
            if balance < econ.warning_floor {
                if !state.warned {
                    state.warned = true;
                    warn!(tick, team = %name, %balance, "bankruptcy warning");
                    scratch.drafts.push(
                        SimEvent::new(SimEventKind::BankruptcyWarning, tick, season)
                            .team(name)
                            .title(format!("{name} in financial trouble"))
                            .body(format!("{name}'s balance has fallen to {balance}."))
                            .angle("finance")
                            .why(format!("balance dropped below {}", econ.warning_floor))
                            .with("balance", balance.to_string())
                            .narrate(format!("Alarm bells at {name} as the money runs short")),
                    );
                }
            } else {
                state.warned = false;
            }
            if balance < econ.insolvency_floor {
                state.insolvent_ticks += 1;
            } else {
                state.insolvent_ticks = 0;
            }
            if state.insolvent_ticks > econ.insolvency_grace_ticks {
                state.team.status = TeamStatus::Withdrawn { tick };
                withdrawn.push(name.clone());
            }
        }
    }

    for name in withdrawn {
        let people: Vec<EntityId> = league
            .team(&name)
            .map(|s| {
                s.team
                    .roster
                    .iter()
                    .copied()
                    .filter(|id| league.entities.get(*id).is_some_and(|e| e.role.is_tradeable()))
                    .collect()
            })
            .unwrap_or_default();
        for id in &people {
            release_to_market(&mut league, *id);
        }
        let balance = league.team(&name).map(|s| s.ledger.balance()).unwrap_or_default();
        warn!(tick, team = %name, %balance, released = people.len(), "team withdrawn after sustained insolvency");
        scratch.drafts.push(
            SimEvent::new(SimEventKind::Insolvency, tick, season)
                .team(&name)
                .title(format!("{name} withdraw from the championship"))
                .body(format!("{name} could not recover their finances and leave the league; {} staff join the market.", people.len()))
                .angle("finance")
                .why(format!("{name} stayed insolvent past the grace period"))
                .with("balance", balance.to_string())
                .with("released", people.len())
                .narrate(format!("{name} are gone from the grid")),
        );
    }
}

/// Age-curve and form drift for people, development drift for cars.
pub(crate) fn apply_growth(
    clock: Res<Clock>,
    mut league: ResMut<League>,
    scratch: Res<TickScratch>,
) {
    let mut rng = stream_rng(league.config.seed, clock.season, clock.tick, Stream::Growth);
    let raced: Vec<EntityId> = scratch
        .race
        .iter()
        .flat_map(|r| r.classification.iter().map(|c| c.driver))
        .collect();
    let League {
        config,
        entities,
        teams,
        ..
    } = &mut *league;

    for id in visit_order(entities.iter()) {
        let deltas = {
            let Some(e) = entities.get(id) else {
                continue;
            };
            let team_form = e
                .team
                .as_ref()
                .and_then(|t| scratch.forms.get(t))
                .copied()
                .unwrap_or(0.0);
            let form = if raced.contains(&id) {
                team_form
            } else if e.role == Role::Driver {
                0.0
            } else {
                team_form * 0.5
            };
            person_deltas(e, form, &config.growth, &mut rng)
        };
        if let Err(e) = entities.apply_delta(id, &deltas) {
            warn!(tick = clock.tick, entity = %id, error = %e, "growth skipped");
            continue;
        }
        if let Some(e) = entities.get_mut(id) {
            if e.team.is_some() {
                e.experience += 1;
            }
        }
    }

    for state in teams.values().filter(|s| s.is_active()) {
        let Some(car) = state.team.car(entities).map(|c| c.id) else {
            continue;
        };
        let drift = car_drift(
            state.team.best_capabilities(entities, Role::Engineer),
            &config.growth,
        );
        if let Some(c) = entities.get_mut(car) {
            c.ratings.shift_all(drift);
        }
    }
}

/// Fold race results into tallies, then recompute every standing.
pub(crate) fn recompute_standings(
    clock: Res<Clock>,
    mut league: ResMut<League>,
    mut records: ResMut<RecordBook>,
    scratch: Res<TickScratch>,
) {
    let max_points = league.config.scoring.max_points();
    let League {
        config,
        entities,
        teams,
        ..
    } = &mut *league;

    if let Some(race) = &scratch.race {
        for c in &race.classification {
            let Some(state) = teams.get_mut(&c.team) else {
                continue;
            };
            state.results.push(race_score(c.points, max_points));
            let t = &mut state.season;
            t.races += 1;
            t.points += c.points;
            t.wins += c.is_win() as u32;
            t.podiums += c.is_podium() as u32;
            t.dnfs += (!c.finished()) as u32;
            let d = t.drivers.entry(c.driver).or_default();
            d.races += 1;
            d.points += c.points;
            d.wins += c.is_win() as u32;
            d.podiums += c.is_podium() as u32;
        }
        for team in &race.forfeits {
            if let Some(state) = teams.get_mut(team) {
                state.results.push(0.0);
                state.season.forfeits += 1;
            }
        }
    }

    for state in teams.values_mut().filter(|s| s.is_active()) {
        let contribution = state
            .team
            .contribution(entities, &config.standings.role_weights);
        state.standing = standing(&state.results, contribution, &config.standings);
        state.standing_history.push((clock.tick, state.standing));
    }

    if scratch.race.is_some() {
        let rows = league
            .championship_table()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ChampionshipStandingRow {
                tick: clock.tick,
                season: clock.season,
                league_id: league.config.league_id.clone(),
                team_name: entry.team.0,
                position: i as u32 + 1,
                points: entry.points,
                races_completed: entry.races,
            })
            .collect();
        records.push_championship(rows);
    }
}

fn season_summary(league: &League, clock: &Clock) -> SeasonSummary {
    let standings = league
        .championship_table()
        .into_iter()
        .enumerate()
        .map(|(i, entry)| SeasonStanding {
            prize: league
                .teams
                .get(&entry.team)
                .map(|s| s.season.prize)
                .unwrap_or_default(),
            team: entry.team,
            position: i as u32 + 1,
            points: entry.points,
            wins: entry.wins,
            podiums: entry.podiums,
            races: entry.races,
        })
        .collect();
    let drivers = league
        .teams
        .values()
        .flat_map(|s| {
            s.season.drivers.iter().map(|(id, d)| DriverSeason {
                entity: *id,
                name: league
                    .entities
                    .get(*id)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| id.to_string()),
                team: s.name().clone(),
                races: d.races,
                wins: d.wins,
                podiums: d.podiums,
                points: d.points,
            })
        })
        .collect();
    let staff = league
        .teams
        .values()
        .flat_map(|s| {
            s.team
                .roster
                .iter()
                .filter_map(|id| league.entities.get(*id))
                .filter(|e| e.is_active() && e.role.is_tradeable() && e.role != Role::Driver)
                .map(|e| StaffSeason {
                    entity: e.id,
                    name: e.name.clone(),
                    role: e.role,
                    team: s.name().clone(),
                })
        })
        .collect();
    SeasonSummary {
        season: clock.season,
        tick: clock.tick,
        league_id: league.config.league_id.clone(),
        standings,
        drivers,
        staff,
    }
}

/// End-of-season turnover: ageing, retirements, expiring contracts, the
/// transfer list and the rookie intake.
fn off_season(league: &mut League, clock: &Clock, drafts: &mut Vec<SimEvent>) {
    let (tick, season) = (clock.tick, clock.season);
    for e in league.entities.iter_mut() {
        if e.is_active() && e.role.ages() {
            e.age += 1;
        }
    }

    let retiring: Vec<EntityId> = league
        .entities
        .active()
        .filter(|e| due_to_retire(e, &league.config.growth))
        .map(|e| e.id)
        .collect();
    for id in retiring {
        let Some((name, role, team)) = league
            .entities
            .get(id)
            .map(|e| (e.name.clone(), e.role, e.team.clone()))
        else {
            continue;
        };
        release_to_market(league, id);
        if let Err(e) = league.entities.retire(id) {
            warn!(tick, entity = %id, error = %e, "retirement failed");
            continue;
        }
        let mut event = SimEvent::new(SimEventKind::Retirement, tick, season)
            .entity(id)
            .title(format!("{name} retires"))
            .body(format!("{role} {name} calls time on a long career."))
            .angle("career")
            .why(format!("{name} passed the retirement age for a {role}"))
            .with("role", role.as_str());
        if let Some(t) = &team {
            event = event.team(t);
        }
        if role == Role::Driver {
            event = event.narrate(format!("{name} hangs up the helmet"));
        }
        drafts.push(event);
    }

    let expiring: Vec<EntityId> = league
        .entities
        .active()
        .filter(|e| e.role.is_tradeable() && e.team.is_some())
        .filter(|e| e.contract_until.is_some_and(|s| s <= season))
        .map(|e| e.id)
        .collect();
    for id in &expiring {
        release_to_market(league, *id);
    }

    // Entering the last season of a deal puts an entity on the transfer list;
    // a signing before then costs the buyer a buyout.
    let mut listed = 0;
    for e in league.entities.iter_mut() {
        if e.is_active()
            && e.role.is_tradeable()
            && e.team.is_some()
            && e.contract_until == Some(season + 1)
        {
            e.available = true;
            listed += 1;
        }
    }

    let rookies = match spawn_rookies(league, season, tick) {
        Ok(ids) => ids.len(),
        Err(e) => {
            warn!(tick, error = %e, "rookie intake failed");
            0
        }
    };
    for state in league.teams.values_mut() {
        state.season = SeasonTally::default();
    }
    info!(season, expired = expiring.len(), listed, rookies, "off-season processed");
}

/// Synchronous history hooks; at the finale also the season close.
pub(crate) fn history_hooks(
    clock: Res<Clock>,
    mut league: ResMut<League>,
    mut tracker: ResMut<HistoricalTracker>,
    mut records: ResMut<RecordBook>,
    mut scratch: ResMut<TickScratch>,
) {
    if let Some(race) = &scratch.race {
        let events = tracker.on_race_complete(race, league.config.scoring.max_points());
        scratch.drafts.extend(events);
    }
    if !clock.is_season_finale(league.ticks_per_season()) {
        return;
    }

    let summary = season_summary(&league, &clock);
    records.push_season(summary.rows());
    let milestones = tracker.on_season_end(&summary);
    scratch.drafts.extend(milestones);

    let mut event = SimEvent::new(SimEventKind::SeasonEnd, clock.tick, clock.season)
        .title(format!("Season {} complete", clock.season))
        .angle("championship")
        .with("season", clock.season);
    if let Some(champ) = summary.champion() {
        event = event
            .team(&champ.team)
            .body(format!(
                "{} win the {} championship with {} points and {} wins.",
                champ.team, clock.season, champ.points, champ.wins
            ))
            .why(format!("{} topped the points table", champ.team))
            .with("champion", champ.team.as_str())
            .with("points", champ.points)
            .narrate(format!("{} are season {} champions", champ.team, clock.season));
    }
    scratch.drafts.push(event);
    info!(
        season = clock.season,
        champion = summary.champion().map(|c| c.team.as_str()).unwrap_or("none"),
        "season closed"
    );

    let mut drafts = std::mem::take(&mut scratch.drafts);
    off_season(&mut league, &clock, &mut drafts);
    scratch.drafts = drafts;
    scratch.season_summary = Some(summary);
}

/// Publish the tick's events in creation order and mirror new ledger entries.
pub(crate) fn publish_events(
    bus: Res<SimEventBus>,
    league: Res<League>,
    mut records: ResMut<RecordBook>,
    mut scratch: ResMut<TickScratch>,
) {
    let drafts = std::mem::take(&mut scratch.drafts);
    for draft in drafts {
        let seq = bus.publish(draft);
        scratch.published.push(seq);
    }
    records.sync_ledgers(league.teams.values());
}
