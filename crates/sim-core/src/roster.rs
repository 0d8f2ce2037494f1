//! Teams, rosters and role slots.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::RoleWeights;
use crate::entity::{Entity, EntityId, EntityStore, TeamName};
use crate::ratings::{Capabilities, Role};

/// Role-weighted sum of the best contribution per role, divided by the total weight.
///
/// Roles with no entry contribute zero, so an unfilled slot drags the score down.
pub fn weighted_contribution<I>(contributions: I, weights: &RoleWeights) -> f32
where
    I: IntoIterator<Item = (Role, f32)>,
{
    let mut best: [Option<f32>; 6] = [None; 6];
    for (role, c) in contributions {
        if let Some(i) = Role::ALL.iter().position(|r| *r == role) {
            best[i] = Some(best[i].map_or(c, |b| b.max(c)));
        }
    }
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    Role::ALL
        .iter()
        .zip(best)
        .map(|(r, b)| weights.for_role(*r) * b.unwrap_or(0.0))
        .sum::<f32>()
        / total
}

/// Who drives a team's decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Human,
    /// AI principal using the named tendency profile.
    Ai { profile: String },
}

impl Control {
    pub fn is_ai(&self) -> bool {
        matches!(self, Control::Ai { .. })
    }
}

/// Competitive state of a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    /// Left the competition after sustained insolvency.
    Withdrawn { tick: u64 },
}

/// Number of entities a team must field per role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterRequirements {
    pub drivers: u32,
    pub engineers: u32,
    pub mechanics: u32,
    pub strategists: u32,
}

impl Default for RosterRequirements {
    fn default() -> Self {
        Self {
            drivers: 2,
            engineers: 1,
            mechanics: 1,
            strategists: 1,
        }
    }
}

impl RosterRequirements {
    /// Required count for a tradeable role; zero otherwise.
    pub fn required(&self, role: Role) -> u32 {
        match role {
            Role::Driver => self.drivers,
            Role::Engineer => self.engineers,
            Role::Mechanic => self.mechanics,
            Role::Strategist => self.strategists,
            Role::Principal | Role::Car => 0,
        }
    }
}

/// A vacancy on a team's roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSlot {
    pub team: TeamName,
    pub role: Role,
    pub vacancies: u32,
}

/// A competing team. Money lives in the team's ledger, held by the runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: TeamName,
    pub control: Control,
    /// AI principal entity, if any.
    pub principal: Option<EntityId>,
    /// Exclusively owned entities.
    pub roster: BTreeSet<EntityId>,
    pub status: TeamStatus,
}

impl Team {
    pub fn new(name: TeamName, control: Control) -> Self {
        Self {
            name,
            control,
            principal: None,
            roster: BTreeSet::new(),
            status: TeamStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TeamStatus::Active
    }

    /// Active roster members of a role, best overall first, id as tie-break.
    pub fn members<'a>(&'a self, store: &'a EntityStore, role: Role) -> Vec<&'a Entity> {
        let mut out: Vec<&Entity> = self
            .roster
            .iter()
            .filter_map(|id| store.get(*id))
            .filter(|e| e.is_active() && e.role == role)
            .collect();
        out.sort_by(|a, b| {
            b.overall()
                .total_cmp(&a.overall())
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Driver fielded in a race: the best active driver on the roster.
    pub fn fielded_driver<'a>(&'a self, store: &'a EntityStore) -> Option<&'a Entity> {
        self.members(store, Role::Driver).into_iter().next()
    }

    pub fn car<'a>(&'a self, store: &'a EntityStore) -> Option<&'a Entity> {
        self.members(store, Role::Car).into_iter().next()
    }

    /// Best capability set for a role, if the role is filled.
    pub fn best_capabilities(&self, store: &EntityStore, role: Role) -> Option<Capabilities> {
        self.members(store, role)
            .first()
            .map(|e| e.capabilities())
    }

    /// Role-weighted contribution of the active roster on the rating scale.
    pub fn contribution(&self, store: &EntityStore, weights: &RoleWeights) -> f32 {
        weighted_contribution(
            self.roster
                .iter()
                .filter_map(|id| store.get(*id))
                .filter(|e| e.is_active())
                .map(|e| (e.role, e.capabilities().contribution())),
            weights,
        )
    }

    /// Open slots against the requirements, in role order.
    pub fn vacancies(&self, store: &EntityStore, req: &RosterRequirements) -> Vec<RoleSlot> {
        Role::ALL
            .iter()
            .filter(|r| r.is_tradeable())
            .filter_map(|&role| {
                let have = self.members(store, role).len() as u32;
                let need = req.required(role);
                (need > have).then(|| RoleSlot {
                    team: self.name.clone(),
                    role,
                    vacancies: need - have,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team_with(store: &mut EntityStore) -> Team {
        let mut team = Team::new(TeamName::from("Apex Racing"), Control::Human);
        for (name, pace) in [("A", 60.0), ("B", 80.0)] {
            let id = store
                .create(Role::Driver, name, 25, &[("pace", pace)], 50.0)
                .unwrap();
            store.assign(id, Some(team.name.clone())).unwrap();
            team.roster.insert(id);
        }
        team
    }

    #[test]
    fn fielded_driver_is_best_overall() {
        let mut store = EntityStore::new();
        let team = team_with(&mut store);
        assert_eq!(team.fielded_driver(&store).unwrap().name, "B");
    }

    #[test]
    fn contribution_counts_only_the_best_per_role() {
        let weights = RoleWeights::default();
        let one = weighted_contribution([(Role::Driver, 80.0)], &weights);
        let two = weighted_contribution([(Role::Driver, 80.0), (Role::Driver, 40.0)], &weights);
        assert_eq!(one, two);
        assert!((one - 80.0 * 0.4).abs() < 1e-4);
        assert_eq!(weighted_contribution(std::iter::empty(), &weights), 0.0);
    }

    #[test]
    fn vacancies_cover_missing_roles() {
        let mut store = EntityStore::new();
        let team = team_with(&mut store);
        let slots = team.vacancies(&store, &RosterRequirements::default());
        let roles: Vec<Role> = slots.iter().map(|s| s.role).collect();
        assert_eq!(roles, vec![Role::Engineer, Role::Mechanic, Role::Strategist]);
        assert!(slots.iter().all(|s| s.vacancies == 1));
    }
}
