#![deny(warnings)]

//! AI principals: utility scoring over the shared action catalogue.
//!
//! An AI team chooses from exactly the [`Action`] values a human team may
//! submit, filtered by the same eligibility predicate and ledger gate. The
//! choice is the action with the highest weighted utility; ties go to the
//! cheaper action, then to catalogue order.

pub mod profiles;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::config::{ActionCosts, StandingsConfig};
use sim_core::{
    weighted_contribution, Entity, EntityId, EntityStore, Ratings, Role, RosterRequirements, Team,
    Tendencies,
};
use sim_econ::{check_eligible, Action, ActionKind, Ledger};
use tracing::debug;

/// Weighted sum of the three outcome predictors. Higher is better.
pub fn utility(scores: &Scores, t: &Tendencies) -> f32 {
    t.standing * scores.standing_gain
        + t.cost_efficiency * scores.cost_efficiency
        + t.roster_need * scores.roster_need
}

/// Tuning for the predictors that is shared by all principals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    /// Number of ticks over which a standing gain is valued.
    pub standing_horizon: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            standing_horizon: 6.0,
        }
    }
}

/// Read-only view of the acting team.
#[derive(Clone, Copy)]
pub struct TeamView<'a> {
    pub team: &'a Team,
    pub entities: &'a EntityStore,
    pub ledger: &'a Ledger,
    pub requirements: &'a RosterRequirements,
    pub standings: &'a StandingsConfig,
    pub costs: &'a ActionCosts,
    /// Payroll plus operating costs for one season.
    pub committed_per_season: Decimal,
}

/// Outcome predictors for one action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Scores {
    /// Expected change of the standing metric, valued over the horizon.
    pub standing_gain: f32,
    /// 1 for free actions, falling to 0 as cost approaches the spendable budget.
    pub cost_efficiency: f32,
    /// +1 when the action fills an open slot, -1 when it opens one.
    pub roster_need: f32,
}

/// The chosen action with its audit data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub utility: f32,
    pub scores: Scores,
    /// Legal, affordable actions that were scored.
    pub considered: usize,
}

/// Money a principal is willing to commit to `action` right now.
///
/// The ledger headroom for the action's transaction kind, less a cushion of
/// `reserve_ratio` times the team's committed costs for a season.
pub fn spendable_budget(view: &TeamView<'_>, action: &Action, t: &Tendencies) -> Decimal {
    let headroom = view.ledger.headroom(action.transaction_kind());
    let ratio = Decimal::from_f32_retain(t.reserve_ratio.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);
    let cushion = (view.committed_per_season.max(Decimal::ZERO) * ratio).round_dp(2);
    (headroom - cushion).max(Decimal::ZERO)
}

enum Change<'a> {
    Ratings(EntityId, Ratings),
    Add(&'a Entity),
    Remove(EntityId),
}

fn contribution_with(view: &TeamView<'_>, change: Option<&Change<'_>>) -> f32 {
    let weights = &view.standings.role_weights;
    let members = view
        .team
        .roster
        .iter()
        .filter_map(|id| view.entities.get(*id))
        .filter(|e| e.is_active());
    let mut entries: Vec<(Role, f32)> = Vec::new();
    for e in members {
        match change {
            Some(Change::Remove(id)) if *id == e.id => continue,
            Some(Change::Ratings(id, r)) if *id == e.id => {
                entries.push((e.role, r.capabilities().contribution()))
            }
            _ => entries.push((e.role, e.capabilities().contribution())),
        }
    }
    if let Some(Change::Add(e)) = change {
        entries.push((e.role, e.capabilities().contribution()));
    }
    weighted_contribution(entries, weights)
}

fn predicted_change<'a>(view: &TeamView<'a>, action: &Action) -> Option<Change<'a>> {
    match &action.kind {
        ActionKind::NoOp => None,
        ActionKind::UpgradeCar { dimension } => {
            let car = view.team.car(view.entities)?;
            let mut r = car.ratings.clone();
            r.apply_delta(&[(dimension.as_str(), view.costs.upgrade_delta)]).ok()?;
            Some(Change::Ratings(car.id, r))
        }
        ActionKind::TrainDriver { driver } => {
            let e = view.entities.get(*driver)?;
            let mut r = e.ratings.clone();
            let d = view.costs.training_delta;
            r.apply_delta(&[("pace", d), ("consistency", d), ("racecraft", d)]).ok()?;
            Some(Change::Ratings(e.id, r))
        }
        ActionKind::Hire { entity, .. } => view.entities.get(*entity).map(Change::Add),
        ActionKind::Release { entity } => Some(Change::Remove(*entity)),
    }
}

fn roster_need(view: &TeamView<'_>, action: &Action) -> f32 {
    let role_of = |id: &EntityId| view.entities.get(*id).map(|e| e.role);
    let open = |role: Role| {
        let have = view.team.members(view.entities, role).len() as u32;
        view.requirements.required(role) as i64 - have as i64
    };
    match &action.kind {
        ActionKind::Hire { entity, .. } => match role_of(entity) {
            Some(role) if open(role) > 0 => 1.0,
            _ => 0.0,
        },
        ActionKind::Release { entity } => match role_of(entity) {
            Some(role) if open(role) >= 0 => -1.0,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

/// Score one action without checking legality.
pub fn score(view: &TeamView<'_>, action: &Action, t: &Tendencies, policy: &DecisionPolicy) -> Scores {
    let before = contribution_with(view, None);
    let after = match predicted_change(view, action) {
        Some(change) => contribution_with(view, Some(&change)),
        None => before,
    };
    let contribution_share = 1.0 - view.standings.results_share;
    let scale = view.standings.scale / 100.0;
    let standing_gain = (after - before) * contribution_share * scale * policy.standing_horizon;

    let budget = spendable_budget(view, action, t);
    let cost_efficiency = if action.cost <= Decimal::ZERO {
        1.0
    } else if budget <= Decimal::ZERO {
        0.0
    } else {
        (Decimal::ONE - action.cost / budget)
            .to_f32()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    };
    Scores {
        standing_gain,
        cost_efficiency,
        roster_need: roster_need(view, action),
    }
}

/// Whether `action` passes the shared eligibility predicate and fits both the
/// ledger floor and the principal's spendable budget.
pub fn is_legal(view: &TeamView<'_>, action: &Action, t: &Tendencies) -> bool {
    check_eligible(action, view.team, view.entities).is_ok()
        && action.affordable(view.ledger)
        && action.cost <= spendable_budget(view, action, t)
}

/// Choose the max-utility legal action; falls back to a no-op.
pub fn decide(
    view: &TeamView<'_>,
    available: &[Action],
    t: &Tendencies,
    policy: &DecisionPolicy,
) -> Decision {
    let mut best: Option<Decision> = None;
    let mut considered = 0;
    for action in available.iter().filter(|a| is_legal(view, a, t)) {
        considered += 1;
        let scores = score(view, action, t, policy);
        let u = utility(&scores, t);
        let better = match &best {
            None => true,
            Some(b) => u > b.utility || (u == b.utility && action.cost < b.action.cost),
        };
        if better {
            best = Some(Decision {
                action: action.clone(),
                utility: u,
                scores,
                considered: 0,
            });
        }
    }
    let mut decision = best.unwrap_or_else(|| {
        let noop = Action::noop();
        let scores = score(view, &noop, t, policy);
        Decision {
            utility: utility(&scores, t),
            action: noop,
            scores,
            considered: 0,
        }
    });
    decision.considered = considered;
    debug!(
        team = %view.team.name,
        action = decision.action.label(),
        utility = decision.utility,
        considered,
        "ai decision"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::{Control, TeamName};
    use sim_econ::{discretionary_actions, OverdraftPolicy};

    struct Fixture {
        team: Team,
        entities: EntityStore,
        ledger: Ledger,
        req: RosterRequirements,
        standings: StandingsConfig,
        costs: ActionCosts,
        committed: Decimal,
    }

    impl Fixture {
        fn view(&self) -> TeamView<'_> {
            TeamView {
                team: &self.team,
                entities: &self.entities,
                ledger: &self.ledger,
                requirements: &self.req,
                standings: &self.standings,
                costs: &self.costs,
                committed_per_season: self.committed,
            }
        }
    }

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn fixture(balance: i64) -> Fixture {
        let mut entities = EntityStore::new();
        let mut team = Team::new(
            TeamName::from("Meridian GP"),
            Control::Ai {
                profile: "balanced".into(),
            },
        );
        let ids = [
            entities.create(Role::Driver, "Tomas Reyes", 26, &[], 62.0).unwrap(),
            entities.create(Role::Driver, "Kai Lindqvist", 22, &[], 55.0).unwrap(),
            entities.create(Role::Engineer, "Ada Brandt", 44, &[], 60.0).unwrap(),
            entities.create(Role::Mechanic, "Rui Costa", 35, &[], 58.0).unwrap(),
            entities.create(Role::Car, "MG-26", 0, &[], 60.0).unwrap(),
        ];
        for id in ids {
            entities.assign(id, Some(team.name.clone())).unwrap();
            team.roster.insert(id);
        }
        Fixture {
            team,
            entities,
            ledger: Ledger::with_opening_balance(OverdraftPolicy::default(), 0, d(balance)).unwrap(),
            req: RosterRequirements::default(),
            standings: StandingsConfig::default(),
            costs: ActionCosts::default(),
            committed: d(1_000_000),
        }
    }

    #[test]
    fn utility_is_monotonic_in_each_predictor() {
        let t = Tendencies::default();
        let base = Scores {
            standing_gain: 0.2,
            cost_efficiency: 0.5,
            roster_need: 0.0,
        };
        let mut more = base;
        more.standing_gain = 0.3;
        assert!(utility(&base, &t) < utility(&more, &t));
        let mut more = base;
        more.cost_efficiency = 0.6;
        assert!(utility(&base, &t) < utility(&more, &t));
    }

    #[test]
    fn broke_team_returns_noop() {
        let f = fixture(0);
        let actions = discretionary_actions(&f.team, &f.entities, &ActionCosts::default());
        let decision = decide(&f.view(), &actions, &Tendencies::default(), &DecisionPolicy::default());
        assert!(decision.action.is_noop());
    }

    #[test]
    fn empty_catalogue_returns_noop() {
        let f = fixture(5_000_000);
        let decision = decide(&f.view(), &[], &Tendencies::default(), &DecisionPolicy::default());
        assert!(decision.action.is_noop());
        assert_eq!(decision.considered, 0);
    }

    #[test]
    fn vacancy_hire_beats_upgrade() {
        let mut f = fixture(5_000_000);
        let strategist = f
            .entities
            .create(Role::Strategist, "Noor Haddad", 40, &[], 60.0)
            .unwrap();
        let mut actions = discretionary_actions(&f.team, &f.entities, &ActionCosts::default());
        actions.push(Action::hire(strategist, d(600_000), d(150_000)));
        let decision = decide(&f.view(), &actions, &Tendencies::default(), &DecisionPolicy::default());
        assert_eq!(
            decision.action.kind,
            ActionKind::Hire {
                entity: strategist,
                salary: d(600_000)
            }
        );
        assert_eq!(decision.scores.roster_need, 1.0);
    }

    #[test]
    fn ties_go_to_the_cheaper_action() {
        let f = fixture(5_000_000);
        let mut t = Tendencies::default();
        t.standing = 0.0;
        t.cost_efficiency = 0.0;
        t.roster_need = 1.0;
        let costs = ActionCosts::default();
        let actions = vec![Action::upgrade_car("downforce", &costs), Action::noop()];
        let decision = decide(&f.view(), &actions, &t, &DecisionPolicy::default());
        assert!(decision.action.is_noop());
    }

    #[test]
    fn reserve_ratio_keeps_money_back() {
        let f = fixture(750_000);
        let mut t = Tendencies::default();
        t.reserve_ratio = 0.5;
        let upgrade = Action::upgrade_car("power_unit", &ActionCosts::default());
        assert!(upgrade.affordable(&f.ledger));
        assert_eq!(spendable_budget(&f.view(), &upgrade, &t), d(250_000));
        assert!(!is_legal(&f.view(), &upgrade, &t));
        t.reserve_ratio = 0.25;
        assert!(is_legal(&f.view(), &upgrade, &t));
    }

    proptest! {
        #[test]
        fn never_selects_more_than_the_spendable_budget(
            balance in 0i64..2_000_000,
            reserve in 0.0f32..0.9,
            standing in 0.0f32..3.0,
            cost_eff in 0.0f32..3.0,
        ) {
            let f = fixture(balance);
            let t = Tendencies { standing, cost_efficiency: cost_eff, roster_need: 1.0, reserve_ratio: reserve };
            let actions = discretionary_actions(&f.team, &f.entities, &ActionCosts::default());
            let decision = decide(&f.view(), &actions, &t, &DecisionPolicy::default());
            prop_assert!(decision.action.cost <= f.ledger.headroom(decision.action.transaction_kind()));
            prop_assert!(decision.action.cost <= spendable_budget(&f.view(), &decision.action, &t));
        }
    }
}
