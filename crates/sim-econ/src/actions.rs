//! Costed, eligibility-gated team actions.
//!
//! Human and AI teams share this catalogue and the same execution path:
//! eligibility, then affordability, then the ledger debit, then the effect.
//! Anything that fails before the debit leaves no trace.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::config::ActionCosts;
use sim_core::{EntityId, EntityStore, Ratings, Role, SimError, Team, RATING_MAX};
use tracing::{info, warn};

use crate::income::fraction_of;
use crate::ledger::{Ledger, Transaction, TransactionKind};
use crate::EconError;

/// Car dimensions offered as upgrade targets.
pub const UPGRADE_TARGETS: [&str; 8] = [
    "power_unit",
    "aero_efficiency",
    "downforce",
    "mechanical_grip",
    "cornering",
    "top_speed",
    "balance",
    "reliability",
];

/// What an action does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    NoOp,
    /// Raise one car rating dimension.
    UpgradeCar { dimension: String },
    /// Raise a driver's core ratings.
    TrainDriver { driver: EntityId },
    /// Sign an entity through the job market at the offered season salary.
    Hire { entity: EntityId, salary: Decimal },
    /// Release a rostered entity, paying severance.
    Release { entity: EntityId },
}

/// A concrete, priced action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Debited in full before the effect applies.
    pub cost: Decimal,
}

impl Action {
    pub fn noop() -> Self {
        Self {
            kind: ActionKind::NoOp,
            cost: Decimal::ZERO,
        }
    }

    pub fn upgrade_car(dimension: &str, costs: &ActionCosts) -> Self {
        Self {
            kind: ActionKind::UpgradeCar {
                dimension: dimension.to_string(),
            },
            cost: costs.upgrade_cost,
        }
    }

    pub fn train_driver(driver: EntityId, costs: &ActionCosts) -> Self {
        Self {
            kind: ActionKind::TrainDriver { driver },
            cost: costs.training_cost,
        }
    }

    /// `cost` is the up-front amount quoted by the job market.
    pub fn hire(entity: EntityId, salary: Decimal, cost: Decimal) -> Self {
        Self {
            kind: ActionKind::Hire { entity, salary },
            cost,
        }
    }

    /// Severance is a share of the entity's season salary.
    pub fn release(entity: EntityId, salary: Decimal, costs: &ActionCosts) -> Self {
        Self {
            kind: ActionKind::Release { entity },
            cost: fraction_of(salary, costs.severance_fraction),
        }
    }

    /// Stable decision label, as written to the audit trail.
    pub fn label(&self) -> &'static str {
        match self.kind {
            ActionKind::NoOp => "no_op",
            ActionKind::UpgradeCar { .. } => "upgrade_car",
            ActionKind::TrainDriver { .. } => "train_driver",
            ActionKind::Hire { .. } => "hire",
            ActionKind::Release { .. } => "release",
        }
    }

    /// Ledger category of the cost.
    pub fn transaction_kind(&self) -> TransactionKind {
        match self.kind {
            ActionKind::NoOp | ActionKind::UpgradeCar { .. } => TransactionKind::Upgrade,
            ActionKind::TrainDriver { .. } => TransactionKind::Training,
            ActionKind::Hire { .. } => TransactionKind::Signing,
            ActionKind::Release { .. } => TransactionKind::Severance,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.kind == ActionKind::NoOp
    }

    /// Whether the team's ledger can pay for this action right now.
    pub fn affordable(&self, ledger: &Ledger) -> bool {
        ledger.can_debit(self.transaction_kind(), self.cost)
    }
}

/// Result of a successfully executed action.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionReceipt {
    pub action: Action,
    pub transaction: Option<Transaction>,
    pub summary: String,
}

/// Mutable state an action may touch.
pub struct ActionContext<'a> {
    pub tick: u64,
    pub season: u32,
    pub team: &'a mut Team,
    pub ledger: &'a mut Ledger,
    pub entities: &'a mut EntityStore,
    pub costs: &'a ActionCosts,
}

/// Eligibility predicate over team and entity state.
pub fn check_eligible(
    action: &Action,
    team: &Team,
    entities: &EntityStore,
) -> Result<(), EconError> {
    if action.cost < Decimal::ZERO {
        return Err(EconError::InvalidAmount(action.cost));
    }
    if !team.is_active() && !action.is_noop() {
        return Err(EconError::Ineligible(format!("{} is not competing", team.name)));
    }
    match &action.kind {
        ActionKind::NoOp => Ok(()),
        ActionKind::UpgradeCar { dimension } => {
            let car = team
                .car(entities)
                .ok_or_else(|| EconError::Ineligible(format!("{} has no car", team.name)))?;
            let current = car.ratings.get(dimension)?;
            if current >= RATING_MAX {
                return Err(EconError::Ineligible(format!("{dimension} is already maxed")));
            }
            Ok(())
        }
        ActionKind::TrainDriver { driver } => {
            let e = entities.require(*driver)?;
            if !team.roster.contains(driver) || !e.is_active() || e.role != Role::Driver {
                return Err(EconError::Ineligible(format!(
                    "{} is not an active driver of {}",
                    e.name, team.name
                )));
            }
            Ok(())
        }
        ActionKind::Hire { entity, salary } => {
            let e = entities.require(*entity)?;
            if *salary < Decimal::ZERO {
                return Err(EconError::InvalidAmount(*salary));
            }
            if team.roster.contains(entity) {
                return Err(EconError::Ineligible(format!("{} already signed", e.name)));
            }
            if !e.on_market() {
                return Err(EconError::Ineligible(format!("{} is not available", e.name)));
            }
            Ok(())
        }
        ActionKind::Release { entity } => {
            let e = entities.require(*entity)?;
            if !team.roster.contains(entity) || !e.role.is_tradeable() {
                return Err(EconError::Ineligible(format!(
                    "{} cannot be released by {}",
                    e.name, team.name
                )));
            }
            Ok(())
        }
    }
}

/// Prepared change to a single entity's ratings.
fn prepared_ratings(
    entities: &EntityStore,
    id: EntityId,
    deltas: &[(&str, f32)],
) -> Result<Ratings, SimError> {
    let mut ratings = entities.require(id)?.ratings.clone();
    ratings.apply_delta(deltas)?;
    Ok(ratings)
}

/// Execute a non-hire action all-or-nothing.
///
/// Hires carry an acceptance predicate and go through the job market, which
/// uses the same eligibility and ledger gate.
pub fn execute(action: &Action, ctx: ActionContext<'_>) -> Result<ActionReceipt, EconError> {
    let ActionContext {
        tick,
        season,
        team,
        ledger,
        entities,
        costs,
    } = ctx;

    if let Err(e) = check_eligible(action, team, entities) {
        warn!(tick, team = %team.name, action = action.label(), error = %e, "action rejected");
        return Err(e);
    }
    if !action.affordable(ledger) {
        let err = EconError::InsufficientFunds {
            needed: action.cost,
            available: ledger.headroom(action.transaction_kind()),
        };
        warn!(tick, team = %team.name, action = action.label(), error = %err, "action rejected");
        return Err(err);
    }

    // Compute the effect before paying so nothing can fail after the debit.
    enum Effect {
        None,
        Ratings(EntityId, Ratings),
        Release(EntityId),
    }
    let (effect, summary) = match &action.kind {
        ActionKind::NoOp => (Effect::None, format!("{} holds position", team.name)),
        ActionKind::UpgradeCar { dimension } => {
            let car = team
                .car(entities)
                .map(|c| c.id)
                .ok_or_else(|| EconError::Ineligible(format!("{} has no car", team.name)))?;
            let ratings =
                prepared_ratings(entities, car, &[(dimension.as_str(), costs.upgrade_delta)])?;
            (
                Effect::Ratings(car, ratings),
                format!("{} upgrades {dimension}", team.name),
            )
        }
        ActionKind::TrainDriver { driver } => {
            let delta = costs.training_delta;
            let ratings = prepared_ratings(
                entities,
                *driver,
                &[("pace", delta), ("consistency", delta), ("racecraft", delta)],
            )?;
            let name = entities.require(*driver)?.name.clone();
            (
                Effect::Ratings(*driver, ratings),
                format!("{} puts {name} through a training programme", team.name),
            )
        }
        ActionKind::Release { entity } => {
            let name = entities.require(*entity)?.name.clone();
            (Effect::Release(*entity), format!("{} releases {name}", team.name))
        }
        ActionKind::Hire { .. } => {
            return Err(EconError::Ineligible(
                "hires are negotiated through the job market".into(),
            ))
        }
    };

    let transaction = if action.cost > Decimal::ZERO {
        Some(
            ledger
                .debit(tick, season, action.transaction_kind(), action.cost, summary.clone())?
                .clone(),
        )
    } else {
        None
    };

    match effect {
        Effect::None => {}
        Effect::Ratings(id, ratings) => {
            if let Some(e) = entities.get_mut(id) {
                e.ratings = ratings;
            }
        }
        Effect::Release(id) => {
            team.roster.remove(&id);
            if let Some(e) = entities.get_mut(id) {
                e.team = None;
                e.available = false;
                e.contract_until = None;
                e.salary = Decimal::ZERO;
            }
        }
    }
    if !action.is_noop() {
        info!(tick, team = %team.name, action = action.label(), cost = %action.cost, "action applied");
    }
    Ok(ActionReceipt {
        action: action.clone(),
        transaction,
        summary,
    })
}

/// Discretionary actions open to a team this tick, before affordability.
///
/// Hires are added by the job market, which knows the candidates.
pub fn discretionary_actions(team: &Team, entities: &EntityStore, costs: &ActionCosts) -> Vec<Action> {
    let mut out = vec![Action::noop()];
    if !team.is_active() {
        return out;
    }
    if let Some(car) = team.car(entities) {
        for dim in UPGRADE_TARGETS {
            if car.ratings.value(dim) < RATING_MAX {
                out.push(Action::upgrade_car(dim, costs));
            }
        }
    }
    for driver in team.members(entities, Role::Driver) {
        out.push(Action::train_driver(driver.id, costs));
    }
    for id in &team.roster {
        if let Some(e) = entities.get(*id) {
            if e.is_active() && e.role.is_tradeable() {
                out.push(Action::release(e.id, e.salary, costs));
            }
        }
    }
    out.retain(|a| check_eligible(a, team, entities).is_ok());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::OverdraftPolicy;
    use sim_core::{Control, TeamName};

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    struct Fixture {
        team: Team,
        ledger: Ledger,
        entities: EntityStore,
        costs: ActionCosts,
        driver: EntityId,
        car: EntityId,
    }

    fn fixture(balance: i64) -> Fixture {
        let mut entities = EntityStore::new();
        let mut team = Team::new(TeamName::from("Apex Racing"), Control::Human);
        let driver = entities
            .create(Role::Driver, "Lena Vogt", 24, &[("pace", 70.0)], 60.0)
            .unwrap();
        let car = entities.create(Role::Car, "AR-26", 0, &[], 60.0).unwrap();
        for id in [driver, car] {
            entities.assign(id, Some(team.name.clone())).unwrap();
            team.roster.insert(id);
        }
        let costs = ActionCosts {
            upgrade_cost: d(30_000),
            ..ActionCosts::default()
        };
        Fixture {
            team,
            ledger: Ledger::with_opening_balance(OverdraftPolicy::default(), 0, d(balance)).unwrap(),
            entities,
            costs,
            driver,
            car,
        }
    }

    fn run(f: &mut Fixture, action: &Action) -> Result<ActionReceipt, EconError> {
        execute(
            action,
            ActionContext {
                tick: 3,
                season: 1,
                team: &mut f.team,
                ledger: &mut f.ledger,
                entities: &mut f.entities,
                costs: &f.costs,
            },
        )
    }

    #[test]
    fn prize_then_upgrade_scenario() {
        let mut f = fixture(1_000_000);
        let start_len = f.ledger.len();
        f.ledger
            .credit(3, 1, TransactionKind::PrizeMoney, d(50_000), "P1 prize")
            .unwrap();
        let action = Action::upgrade_car("downforce", &f.costs);
        let before = f.entities.get(f.car).unwrap().ratings.value("downforce");
        run(&mut f, &action).unwrap();
        assert_eq!(f.ledger.balance(), d(1_020_000));
        let new: Vec<&Transaction> = f.ledger.entries()[start_len..].iter().collect();
        assert_eq!(new.len(), 2);
        assert_eq!(new.iter().map(|t| t.amount).sum::<Decimal>(), d(20_000));
        let after = f.entities.get(f.car).unwrap().ratings.value("downforce");
        assert_eq!(after, before + f.costs.upgrade_delta);
        f.ledger.verify().unwrap();
    }

    #[test]
    fn unaffordable_action_leaves_no_trace() {
        let mut f = fixture(10_000);
        let ledger_before = f.ledger.clone();
        let car_before = f.entities.get(f.car).unwrap().clone();
        let action = Action::upgrade_car("downforce", &f.costs);
        let err = run(&mut f, &action).unwrap_err();
        assert!(matches!(err, EconError::InsufficientFunds { .. }));
        assert_eq!(f.ledger, ledger_before);
        assert_eq!(f.entities.get(f.car).unwrap(), &car_before);
    }

    #[test]
    fn unknown_dimension_is_invalid_input() {
        let mut f = fixture(1_000_000);
        let action = Action::upgrade_car("warp_core", &f.costs);
        let err = run(&mut f, &action).unwrap_err();
        assert!(matches!(
            err,
            EconError::Core(SimError::UnknownRating { .. })
        ));
        assert_eq!(f.ledger.len(), 1);
    }

    #[test]
    fn release_pays_severance_and_frees_entity() {
        let mut f = fixture(1_000_000);
        f.entities.get_mut(f.driver).unwrap().salary = d(400_000);
        let action = Action::release(f.driver, d(400_000), &f.costs);
        assert_eq!(action.cost, d(200_000));
        run(&mut f, &action).unwrap();
        assert!(!f.team.roster.contains(&f.driver));
        assert!(f.entities.get(f.driver).unwrap().team.is_none());
        assert_eq!(f.ledger.balance(), d(800_000));
    }

    #[test]
    fn hire_is_routed_elsewhere() {
        let mut f = fixture(1_000_000);
        let free = f
            .entities
            .create(Role::Engineer, "Ines Albero", 40, &[], 60.0)
            .unwrap();
        let action = Action::hire(free, d(500_000), d(125_000));
        assert!(check_eligible(&action, &f.team, &f.entities).is_ok());
        assert!(matches!(run(&mut f, &action), Err(EconError::Ineligible(_))));
        assert_eq!(f.ledger.len(), 1);
    }

    #[test]
    fn discretionary_catalogue_is_eligible() {
        let f = fixture(1_000_000);
        let actions = discretionary_actions(&f.team, &f.entities, &f.costs);
        assert!(actions[0].is_noop());
        assert_eq!(
            actions
                .iter()
                .filter(|a| matches!(a.kind, ActionKind::UpgradeCar { .. }))
                .count(),
            UPGRADE_TARGETS.len()
        );
        assert!(actions
            .iter()
            .any(|a| a.kind == ActionKind::TrainDriver { driver: f.driver }));
    }
}
