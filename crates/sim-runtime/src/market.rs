//! Job market: openings, candidates and negotiation.
//!
//! A hire goes through the same eligibility predicate and ledger gate as any
//! other [`Action`]; the market only adds the entity's acceptance rule and
//! the ownership transfer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{EntityId, Role, RoleSlot, SimError, SimEvent, SimEventKind, TeamName};
use sim_econ::{asking_salary, check_eligible, fraction_of, Action, TransactionKind};
use tracing::{info, warn};

use crate::state::{Clock, League};
use crate::MarketError;

/// Hire actions offered to an AI team per open role.
const CANDIDATES_PER_OPENING: usize = 3;

/// Optional narrowing of a candidate search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub min_overall: Option<f32>,
    pub max_age: Option<u32>,
    pub max_asking: Option<Decimal>,
    pub limit: Option<usize>,
}

impl CandidateFilter {
    pub fn validate(&self) -> Result<(), SimError> {
        if let Some(v) = self.min_overall {
            if !v.is_finite() {
                return Err(SimError::InvalidInput("min_overall must be finite".into()));
            }
        }
        if self.max_asking.is_some_and(|m| m < Decimal::ZERO) {
            return Err(SimError::InvalidInput("max_asking must not be negative".into()));
        }
        if self.limit == Some(0) {
            return Err(SimError::InvalidInput("limit must be positive".into()));
        }
        Ok(())
    }
}

/// An entity on the market with its asking salary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entity: EntityId,
    pub name: String,
    pub role: Role,
    pub age: u32,
    pub overall: f32,
    /// Current team when the entity is rostered but available.
    pub team: Option<TeamName>,
    pub asking: Decimal,
}

/// A completed signing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub entity: EntityId,
    pub name: String,
    pub role: Role,
    pub from: Option<TeamName>,
    pub to: TeamName,
    pub salary: Decimal,
    pub signing_fee: Decimal,
    pub buyout: Decimal,
    pub contract_until: u32,
}

/// Open roster slots of a team; none once it has withdrawn.
pub fn list_openings(league: &League, team: &TeamName) -> Result<Vec<RoleSlot>, SimError> {
    let state = league.team(team)?;
    if !state.is_active() {
        return Ok(Vec::new());
    }
    Ok(state
        .team
        .vacancies(&league.entities, &league.config.market.requirements))
}

/// Asking season salary of an entity.
pub fn quote(league: &League, entity: EntityId) -> Result<Decimal, SimError> {
    let e = league.entities.require(entity)?;
    Ok(asking_salary(e.overall(), &league.config.market.salary_per_tier))
}

/// Entities of `role` on the market, best overall first.
pub fn list_candidates(
    league: &League,
    role: Role,
    filter: &CandidateFilter,
) -> Result<Vec<Candidate>, SimError> {
    filter.validate()?;
    let tiers = &league.config.market.salary_per_tier;
    let mut out: Vec<Candidate> = league
        .entities
        .active()
        .filter(|e| e.role == role && e.on_market())
        .map(|e| Candidate {
            entity: e.id,
            name: e.name.clone(),
            role: e.role,
            age: e.age,
            overall: e.overall(),
            team: e.team.clone(),
            asking: asking_salary(e.overall(), tiers),
        })
        .filter(|c| filter.min_overall.map_or(true, |m| c.overall >= m))
        .filter(|c| filter.max_age.map_or(true, |m| c.age <= m))
        .filter(|c| filter.max_asking.map_or(true, |m| c.asking <= m))
        .collect();
    out.sort_by(|a, b| {
        b.overall
            .total_cmp(&a.overall)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    out.truncate(filter.limit.unwrap_or(usize::MAX));
    Ok(out)
}

/// Signing fee and buyout due up front for `entity` at `salary`.
pub fn upfront_cost(league: &League, entity: EntityId, salary: Decimal) -> Result<(Decimal, Decimal), SimError> {
    let e = league.entities.require(entity)?;
    let m = &league.config.market;
    let signing = fraction_of(salary, m.signing_fee_fraction);
    let buyout = if e.team.is_some() {
        fraction_of(e.salary, m.buyout_fraction)
    } else {
        Decimal::ZERO
    };
    Ok((signing, buyout))
}

/// Hire actions for each open slot of `team`: the best few candidates at
/// their asking salary.
pub fn hire_actions(league: &League, team: &TeamName) -> Vec<Action> {
    let Ok(openings) = list_openings(league, team) else {
        return Vec::new();
    };
    let filter = CandidateFilter {
        limit: Some(CANDIDATES_PER_OPENING),
        ..CandidateFilter::default()
    };
    let mut out = Vec::new();
    for slot in openings {
        let Ok(candidates) = list_candidates(league, slot.role, &filter) else {
            continue;
        };
        for c in candidates.into_iter().filter(|c| c.team.as_ref() != Some(team)) {
            if let Ok((fee, buyout)) = upfront_cost(league, c.entity, c.asking) {
                out.push(Action::hire(c.entity, c.asking, fee + buyout));
            }
        }
    }
    out
}

/// Whether an offer meets the entity's acceptance predicate.
pub fn accepts(asking: Decimal, offered: Decimal, ratio: Decimal) -> bool {
    offered >= (asking * ratio).round_dp(2)
}

/// Sign `entity` to `team` at `salary` per season.
///
/// Checks, in order: the shared hire eligibility, an open slot for the role,
/// the acceptance predicate and affordability of the up-front cost. Nothing
/// changes unless every check passes.
pub fn negotiate(
    league: &mut League,
    clock: &Clock,
    team: &TeamName,
    entity: EntityId,
    salary: Decimal,
) -> Result<(Transfer, SimEvent), MarketError> {
    let tick = clock.tick;
    let (fee, buyout) = upfront_cost(league, entity, salary)?;
    let action = Action::hire(entity, salary, fee + buyout);
    let state = league.team(team)?;
    let e = league.entities.require(entity)?;
    if !e.on_market() {
        return Err(MarketError::NotAvailable(entity));
    }
    check_eligible(&action, &state.team, &league.entities)?;
    let role = e.role;
    let has_opening = list_openings(league, team)?.iter().any(|s| s.role == role);
    if !has_opening {
        return Err(MarketError::NoOpening {
            team: team.clone(),
            role,
        });
    }
    let asking = asking_salary(e.overall(), &league.config.market.salary_per_tier);
    if !accepts(asking, salary, league.config.market.acceptance_ratio) {
        warn!(tick, team = %team, entity = %entity, %asking, offered = %salary, "offer rejected");
        return Err(MarketError::OfferRejected {
            asking,
            offered: salary,
        });
    }
    if !action.affordable(&state.ledger) {
        let err = sim_econ::EconError::InsufficientFunds {
            needed: action.cost,
            available: state.ledger.headroom(TransactionKind::Signing),
        };
        warn!(tick, team = %team, entity = %entity, error = %err, "signing unaffordable");
        return Err(err.into());
    }

    let name = e.name.clone();
    let from = e.team.clone();
    let season = clock.contract_season(league.ticks_per_season());
    let contract_until = season + league.config.market.contract_seasons.max(1) - 1;

    let buyer = league.team_mut(team)?;
    if action.cost > Decimal::ZERO {
        buyer.ledger.debit(
            tick,
            clock.season,
            TransactionKind::Signing,
            action.cost,
            format!("signing {name}"),
        )?;
    }
    buyer.team.roster.insert(entity);
    if let Some(seller) = from.as_ref().and_then(|f| league.teams.get_mut(f)) {
        seller.team.roster.remove(&entity);
        if buyout > Decimal::ZERO {
            seller.ledger.credit(
                tick,
                clock.season,
                TransactionKind::TransferIncome,
                buyout,
                format!("{name} bought out by {team}"),
            )?;
        }
    }
    league.entities.assign(entity, Some(team.clone()))?;
    if let Some(signed) = league.entities.get_mut(entity) {
        signed.salary = salary;
        signed.contract_until = Some(contract_until);
    }

    info!(tick, team = %team, entity = %entity, %salary, from = ?from, "signing completed");
    let transfer = Transfer {
        entity,
        name: name.clone(),
        role,
        from: from.clone(),
        to: team.clone(),
        salary,
        signing_fee: fee,
        buyout,
        contract_until,
    };
    let mut event = SimEvent::new(SimEventKind::Transfer, tick, clock.season)
        .team(team)
        .entity(entity)
        .title(format!("{name} joins {team}"))
        .body(match &from {
            Some(f) => format!("{team} buy out {name}'s contract at {f} and sign a deal to season {contract_until}."),
            None => format!("{team} sign {role} {name} on a deal to season {contract_until}."),
        })
        .angle("market")
        .why(format!("{team} filled an open {role} seat"))
        .with("role", role.as_str())
        .with("salary", salary.to_string())
        .with("signing_fee", fee.to_string())
        .with("buyout", buyout.to_string());
    if let Some(f) = &from {
        event = event.team(f);
    }
    if role == Role::Driver {
        event = event.narrate(format!("{name} signs for {team}"));
    }
    Ok((transfer, event))
}

/// Clear an entity's team and contract; it joins the market as a free agent.
pub(crate) fn release_to_market(league: &mut League, entity: EntityId) {
    if let Some(team) = league.entities.get(entity).and_then(|e| e.team.clone()) {
        if let Some(state) = league.teams.get_mut(&team) {
            state.team.roster.remove(&entity);
        }
    }
    if let Some(e) = league.entities.get_mut(entity) {
        e.team = None;
        e.available = false;
        e.salary = Decimal::ZERO;
        e.contract_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::build_league;
    use sim_core::LeagueConfig;

    fn league() -> League {
        build_league(LeagueConfig::default()).unwrap()
    }

    fn apex() -> TeamName {
        TeamName::from("Apex Racing")
    }

    fn open_driver_seat(league: &mut League) -> EntityId {
        let driver = league.team(&apex()).unwrap().team.members(&league.entities, Role::Driver)[1].id;
        release_to_market(league, driver);
        driver
    }

    #[test]
    fn candidates_are_best_first_and_filtered() {
        let league = league();
        let all = list_candidates(&league, Role::Driver, &CandidateFilter::default()).unwrap();
        assert!(!all.is_empty());
        assert!(all.windows(2).all(|w| w[0].overall >= w[1].overall));
        assert!(all.iter().all(|c| c.team.is_none()));
        let capped = CandidateFilter {
            limit: Some(1),
            ..CandidateFilter::default()
        };
        assert_eq!(list_candidates(&league, Role::Driver, &capped).unwrap().len(), 1);
        let bad = CandidateFilter {
            limit: Some(0),
            ..CandidateFilter::default()
        };
        assert!(matches!(
            list_candidates(&league, Role::Driver, &bad),
            Err(SimError::InvalidInput(_))
        ));
    }

    #[test]
    fn lowball_offer_is_rejected_without_side_effects() {
        let mut league = league();
        open_driver_seat(&mut league);
        let target = list_candidates(&league, Role::Driver, &CandidateFilter::default()).unwrap()[0].clone();
        let before = league.team(&apex()).unwrap().ledger.len();
        let err = negotiate(&mut league, &Clock::default(), &apex(), target.entity, target.asking / Decimal::from(2));
        assert!(matches!(err, Err(MarketError::OfferRejected { .. })));
        assert_eq!(league.team(&apex()).unwrap().ledger.len(), before);
        assert!(league.entities.get(target.entity).unwrap().team.is_none());
    }

    #[test]
    fn accepted_offer_moves_the_entity_and_pays_the_fee() {
        let mut league = league();
        open_driver_seat(&mut league);
        let target = list_candidates(&league, Role::Driver, &CandidateFilter::default()).unwrap()[0].clone();
        let balance = league.team(&apex()).unwrap().ledger.balance();
        let (transfer, event) = negotiate(&mut league, &Clock::default(), &apex(), target.entity, target.asking).unwrap();
        assert_eq!(transfer.to, apex());
        assert_eq!(transfer.contract_until, 2);
        assert_eq!(event.kind, SimEventKind::Transfer);
        assert!(event.is_narratable());
        let state = league.team(&apex()).unwrap();
        assert!(state.team.roster.contains(&target.entity));
        assert_eq!(state.ledger.balance(), balance - transfer.signing_fee);
        let e = league.entities.get(target.entity).unwrap();
        assert_eq!(e.team, Some(apex()));
        assert_eq!(e.salary, target.asking);
    }

    #[test]
    fn full_roster_has_no_opening() {
        let mut league = league();
        let target = list_candidates(&league, Role::Driver, &CandidateFilter::default()).unwrap()[0].clone();
        let err = negotiate(&mut league, &Clock::default(), &apex(), target.entity, target.asking);
        assert!(matches!(err, Err(MarketError::NoOpening { role: Role::Driver, .. })));
    }

    #[test]
    fn rostered_players_are_not_available() {
        let mut league = league();
        open_driver_seat(&mut league);
        let rival = TeamName::from("Meridian GP");
        let theirs = league.team(&rival).unwrap().team.members(&league.entities, Role::Driver)[0].id;
        let err = negotiate(&mut league, &Clock::default(), &apex(), theirs, Decimal::new(10_000_000, 0));
        assert_eq!(err.unwrap_err(), MarketError::NotAvailable(theirs));
    }

    #[test]
    fn available_player_is_bought_out() {
        let mut league = league();
        open_driver_seat(&mut league);
        let rival = TeamName::from("Meridian GP");
        let theirs = league.team(&rival).unwrap().team.members(&league.entities, Role::Driver)[1].id;
        league.entities.get_mut(theirs).unwrap().available = true;
        let rival_balance = league.team(&rival).unwrap().ledger.balance();
        let offer = quote(&league, theirs).unwrap();
        let (transfer, _) = negotiate(&mut league, &Clock::default(), &apex(), theirs, offer).unwrap();
        assert_eq!(transfer.from, Some(rival.clone()));
        assert!(transfer.buyout > Decimal::ZERO);
        let rival_state = league.team(&rival).unwrap();
        assert!(!rival_state.team.roster.contains(&theirs));
        assert_eq!(rival_state.ledger.balance(), rival_balance + transfer.buyout);
    }
}
