//! The authoritative simulation instance.
//!
//! [`SimulationEngine`] owns a `bevy_ecs` [`World`] holding the league, the
//! clock, the history tracker, the record book and the event bus, and one
//! chained [`Schedule`] that advances it a tick at a time. Mutating entry
//! points are methods on the engine; observers get an [`EventReader`] or a
//! [`QuerySurface`], neither of which can write.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use rust_decimal::Decimal;
use sim_ai::{decide, Decision};
use sim_core::records::RecordBatch;
use sim_core::{EntityId, LeagueConfig, Role, RoleSlot, SimError, SimEvent, TeamName};
use sim_econ::{discretionary_actions, Action};
use tracing::{debug, info, warn};

use crate::bus::{ConsumerKind, ConsumerRegistry, EventReader, SimEventBus};
use crate::history::{HistoricalTracker, SeasonSummary};
use crate::market::{self, Candidate, CandidateFilter, Transfer};
use crate::query::QuerySurface;
use crate::race::RaceResult;
use crate::records::RecordBook;
use crate::setup::build_league;
use crate::snapshot::{LeagueSnapshot, SNAPSHOT_VERSION};
use crate::state::{Clock, DecisionRecord, League, TickScratch};
use crate::systems::{
    apply_action, apply_growth, begin_tick, history_hooks, principal_decisions, publish_events,
    recompute_standings, run_race, settle_economy,
};
use crate::{ConfigError, MarketError};

/// Result of an action applied through the shared path.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub action: Action,
    pub summary: String,
    /// Set for hires.
    pub transfer: Option<Transfer>,
    /// Published events, carrying their sequence numbers once returned by the engine.
    pub events: Vec<SimEvent>,
}

/// What one tick did.
#[derive(Clone, Debug)]
pub struct TickSummary {
    pub tick: u64,
    pub season: u32,
    pub race: Option<RaceResult>,
    pub decisions: Vec<DecisionRecord>,
    /// Sequence numbers published this tick.
    pub events: Vec<u64>,
    /// Set on the tick that closed a season.
    pub season_summary: Option<SeasonSummary>,
}

pub struct SimulationEngine {
    world: World,
    schedule: Schedule,
}

impl SimulationEngine {
    /// Validate `config`, generate the league and build the engine.
    pub fn new(config: LeagueConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_league(build_league(config)?))
    }

    pub fn from_league(league: League) -> Self {
        let tracker = HistoricalTracker::new(league.config.history.clone());
        Self::assemble(
            league,
            Clock::default(),
            tracker,
            RecordBook::default(),
            SimEventBus::new(),
        )
    }

    /// Rebuild an engine from a snapshot taken between ticks.
    pub fn from_snapshot(snapshot: LeagueSnapshot) -> Result<Self, SimError> {
        if snapshot.format_version != SNAPSHOT_VERSION {
            return Err(SimError::InvalidInput(format!(
                "unsupported snapshot version {}",
                snapshot.format_version
            )));
        }
        snapshot.league.entities.validate()?;
        for state in snapshot.league.teams.values() {
            state.ledger.verify().map_err(|e| {
                SimError::InvalidInput(format!("ledger of {}: {e}", state.name()))
            })?;
        }
        info!(
            tick = snapshot.clock.tick,
            season = snapshot.clock.season,
            events = snapshot.events.len(),
            "engine restored from snapshot"
        );
        Ok(Self::assemble(
            snapshot.league,
            snapshot.clock,
            snapshot.tracker,
            snapshot.records,
            SimEventBus::restore(snapshot.events),
        ))
    }

    fn assemble(
        league: League,
        clock: Clock,
        tracker: HistoricalTracker,
        records: RecordBook,
        bus: SimEventBus,
    ) -> Self {
        let mut world = World::new();
        world.insert_resource(league);
        world.insert_resource(clock);
        world.insert_resource(tracker);
        world.insert_resource(records);
        world.insert_resource(bus);
        world.insert_resource(TickScratch::default());

        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);
        schedule.add_systems(
            (
                begin_tick,
                principal_decisions,
                run_race,
                settle_economy,
                apply_growth,
                recompute_standings,
                history_hooks,
                publish_events,
            )
                .chain(),
        );
        Self { world, schedule }
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> TickSummary {
        self.schedule.run(&mut self.world);
        let clock = *self.world.resource::<Clock>();
        let mut scratch = self.world.resource_mut::<TickScratch>();
        let summary = TickSummary {
            tick: clock.tick,
            season: clock.season,
            race: scratch.race.take(),
            decisions: std::mem::take(&mut scratch.decisions),
            events: std::mem::take(&mut scratch.published),
            season_summary: scratch.season_summary.take(),
        };
        debug!(tick = summary.tick, events = summary.events.len(), "tick complete");
        summary
    }

    pub fn run_ticks(&mut self, n: u64) -> Vec<TickSummary> {
        (0..n).map(|_| self.tick()).collect()
    }

    /// Run to the end of the current season (or the whole next one when
    /// called right after a finale).
    pub fn run_season(&mut self) -> Option<SeasonSummary> {
        let tps = self.league().ticks_per_season();
        let clock = self.clock();
        let remaining = if clock.tick_in_season >= tps {
            tps
        } else {
            tps - clock.tick_in_season
        };
        let mut closed = None;
        for _ in 0..remaining {
            if let Some(summary) = self.tick().season_summary {
                closed = Some(summary);
            }
        }
        closed
    }

    fn require_human(&self, team: &TeamName) -> Result<(), SimError> {
        let state = self.league().team(team)?;
        if state.team.control.is_ai() {
            return Err(SimError::InvalidInput(format!(
                "{team} is run by its AI principal"
            )));
        }
        Ok(())
    }

    fn run_action(&mut self, team: &TeamName, action: &Action) -> Result<ActionOutcome, MarketError> {
        let clock = self.clock();
        let mut outcome = {
            let mut league = self.world.resource_mut::<League>();
            apply_action(&mut league, &clock, team, action)?
        };
        let bus = self.world.resource::<SimEventBus>();
        for event in &mut outcome.events {
            event.seq = bus.publish(event.clone());
        }
        self.world
            .resource_scope(|world, mut records: Mut<RecordBook>| {
                records.sync_ledgers(world.resource::<League>().teams.values());
            });
        Ok(outcome)
    }

    /// Apply an action for a human-controlled team through the same gate the
    /// AI uses. Runs between ticks; entries carry the last completed tick.
    pub fn submit_action(&mut self, team: &TeamName, action: Action) -> Result<ActionOutcome, MarketError> {
        self.require_human(team)?;
        self.run_action(team, &action).map_err(|e| {
            warn!(team = %team, action = action.label(), error = %e, "submitted action rejected");
            e
        })
    }

    /// Offer `entity` a contract at `salary` per season.
    pub fn sign(&mut self, team: &TeamName, entity: EntityId, salary: Decimal) -> Result<Transfer, MarketError> {
        self.require_human(team)?;
        let (fee, buyout) = market::upfront_cost(self.league(), entity, salary)?;
        let outcome = self.run_action(team, &Action::hire(entity, salary, fee + buyout))?;
        outcome.transfer.ok_or(MarketError::NotAvailable(entity))
    }

    pub fn list_openings(&self, team: &TeamName) -> Result<Vec<RoleSlot>, SimError> {
        market::list_openings(self.league(), team)
    }

    pub fn list_candidates(&self, role: Role, filter: &CandidateFilter) -> Result<Vec<Candidate>, SimError> {
        market::list_candidates(self.league(), role, filter)
    }

    /// The full catalogue a team may pick from this tick, hires included.
    pub fn available_actions(&self, team: &TeamName) -> Result<Vec<Action>, SimError> {
        let league = self.league();
        let state = league.team(team)?;
        let mut out = discretionary_actions(&state.team, &league.entities, &league.config.actions);
        out.extend(market::hire_actions(league, team));
        Ok(out)
    }

    /// What the team's principal would do now. Human teams are advised with
    /// the default tendencies.
    pub fn advise(&self, team: &TeamName) -> Result<Decision, SimError> {
        let league = self.league();
        let state = league.team(team)?;
        let catalogue = self.available_actions(team)?;
        let tendencies = league.tendencies_for(&state.team);
        Ok(decide(&league.view(state), &catalogue, &tendencies, &league.policy))
    }

    pub fn queries(&self) -> QuerySurface<'_> {
        QuerySurface::new(
            self.world.resource::<League>(),
            self.world.resource::<RecordBook>(),
            self.world.resource::<HistoricalTracker>(),
            self.clock(),
        )
    }

    pub fn bus(&self) -> EventReader {
        self.world.resource::<SimEventBus>().reader()
    }

    /// Consumers reading the bus from its start.
    pub fn consumers(&self, kinds: &[ConsumerKind]) -> ConsumerRegistry {
        ConsumerRegistry::new(&self.bus(), kinds)
    }

    pub fn clock(&self) -> Clock {
        *self.world.resource::<Clock>()
    }

    pub fn league(&self) -> &League {
        self.world.resource::<League>()
    }

    pub fn tracker(&self) -> &HistoricalTracker {
        self.world.resource::<HistoricalTracker>()
    }

    pub fn records(&self) -> &RecordBook {
        self.world.resource::<RecordBook>()
    }

    /// Rows not yet acknowledged, for a between-tick flush.
    pub fn pending_record_batch(&self) -> RecordBatch {
        self.records().pending_batch(self.tracker())
    }

    /// Acknowledge a batch once the store has committed it.
    pub fn ack_record_batch(&mut self, batch: &RecordBatch) {
        self.world.resource_mut::<RecordBook>().ack_batch(batch);
    }

    pub fn snapshot(&self) -> LeagueSnapshot {
        LeagueSnapshot {
            format_version: SNAPSHOT_VERSION,
            clock: self.clock(),
            league: self.league().clone(),
            tracker: self.tracker().clone(),
            records: self.records().clone(),
            events: self.bus().all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::SimEventKind;
    use sim_econ::{ActionKind, EconError};

    fn engine() -> SimulationEngine {
        SimulationEngine::new(LeagueConfig::default()).unwrap()
    }

    fn apex() -> TeamName {
        TeamName::from("Apex Racing")
    }

    #[test]
    fn races_fall_on_the_calendar() {
        let mut engine = engine();
        let every = engine.league().config.season.ticks_between_races as u64;
        let ticks = engine.run_ticks(every * 2);
        let raced: Vec<u64> = ticks.iter().filter(|t| t.race.is_some()).map(|t| t.tick).collect();
        assert_eq!(raced, vec![every, every * 2]);
        let first = ticks[every as usize - 1].race.as_ref().unwrap();
        assert_eq!(first.race_number, 1);
        assert_eq!(first.track, engine.league().config.season.tracks[0]);
        assert_eq!(first.field_size() as usize, engine.league().teams.len());
    }

    #[test]
    fn ai_teams_decide_every_tick() {
        let mut engine = engine();
        let summary = engine.tick();
        let ai = engine
            .league()
            .teams
            .values()
            .filter(|s| s.team.control.is_ai())
            .count();
        assert_eq!(summary.decisions.len(), ai);
        assert_eq!(engine.records().team_outcomes().len(), ai);
        assert!(summary.decisions.iter().all(|d| d.team != apex()));
    }

    #[test]
    fn human_upgrade_is_published_and_recorded() {
        let mut engine = engine();
        let action = Action::upgrade_car("downforce", &engine.league().config.actions);
        let before = engine.records().financial_transactions().len();
        let outcome = engine.submit_action(&apex(), action).unwrap();
        assert_eq!(outcome.events[0].kind, SimEventKind::ActionApplied);
        assert_eq!(engine.bus().get(outcome.events[0].seq), Some(outcome.events[0].clone()));
        assert!(engine.records().financial_transactions().len() > before);
    }

    #[test]
    fn unaffordable_human_action_changes_nothing() {
        let mut engine = engine();
        let mut action = Action::upgrade_car("downforce", &engine.league().config.actions);
        action.cost = Decimal::new(1_000_000_000, 0);
        let ledger = engine.league().team(&apex()).unwrap().ledger.clone();
        let err = engine.submit_action(&apex(), action).unwrap_err();
        assert!(matches!(err, MarketError::Econ(EconError::InsufficientFunds { .. })));
        assert_eq!(engine.league().team(&apex()).unwrap().ledger, ledger);
        assert!(engine.bus().is_empty());
    }

    #[test]
    fn ai_teams_cannot_be_driven_from_outside() {
        let mut engine = engine();
        let err = engine
            .submit_action(&TeamName::from("Meridian GP"), Action::noop())
            .unwrap_err();
        assert!(matches!(err, MarketError::Core(SimError::InvalidInput(_))));
    }

    #[test]
    fn advice_is_drawn_from_the_available_catalogue() {
        let engine = engine();
        let catalogue = engine.available_actions(&apex()).unwrap();
        let advice = engine.advise(&apex()).unwrap();
        assert!(advice.action.is_noop() || catalogue.contains(&advice.action));
        assert!(!catalogue.iter().any(|a| matches!(a.kind, ActionKind::Hire { .. })));
    }

    #[test]
    fn a_full_season_closes_with_a_summary() {
        let mut engine = engine();
        let summary = engine.run_season().unwrap();
        assert_eq!(summary.season, 1);
        assert_eq!(engine.clock().season, 1);
        assert!(engine.clock().is_season_finale(engine.league().ticks_per_season()));
        assert!(engine.tracker().has_processed(1));
        let champion = summary.champion().unwrap();
        assert!(champion.points > 0);
        let ends = engine
            .bus()
            .all()
            .into_iter()
            .filter(|e| e.kind == SimEventKind::SeasonEnd)
            .count();
        assert_eq!(ends, 1);
        let next = engine.run_season().unwrap();
        assert_eq!(next.season, 2);
    }

    #[test]
    fn listed_rival_entity_is_bought_out_after_the_off_season() {
        let mut engine = engine();
        engine.run_season().unwrap();
        let listed: Vec<Candidate> = Role::ALL
            .into_iter()
            .filter(|r| r.is_tradeable())
            .flat_map(|r| engine.list_candidates(r, &CandidateFilter::default()).unwrap())
            .filter(|c| c.team.as_ref().is_some_and(|t| t != &apex()))
            .collect();
        assert!(!listed.is_empty());
        let target = listed[0].clone();
        let seller = target.team.clone().unwrap();

        let has_seat = engine
            .list_openings(&apex())
            .unwrap()
            .iter()
            .any(|s| s.role == target.role);
        if !has_seat {
            let league = engine.league();
            let member = league.team(&apex()).unwrap().team.members(&league.entities, target.role)[0];
            let release = Action::release(member.id, member.salary, &league.config.actions);
            engine.submit_action(&apex(), release).unwrap();
        }

        let seller_balance = engine.league().team(&seller).unwrap().ledger.balance();
        let transfer = engine.sign(&apex(), target.entity, target.asking).unwrap();
        assert_eq!(transfer.from, Some(seller.clone()));
        assert!(transfer.buyout > Decimal::ZERO);
        let seller_state = engine.league().team(&seller).unwrap();
        assert!(!seller_state.team.roster.contains(&target.entity));
        assert_eq!(seller_state.ledger.balance(), seller_balance + transfer.buyout);
        let signed = engine.league().entities.get(target.entity).unwrap();
        assert_eq!(signed.team, Some(apex()));
        assert!(!signed.available);
    }
}
