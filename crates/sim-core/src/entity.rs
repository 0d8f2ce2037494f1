//! Rated entities and the store that owns them.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ratings::{Capabilities, Ratings, Role};
use crate::SimError;

/// Stable identifier of an entity; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique team key, e.g. "Apex Racing".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamName(pub String);

impl TeamName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamName {
    fn from(s: &str) -> Self {
        TeamName(s.to_string())
    }
}

/// Lifecycle of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    /// Out of the active pool; the record is kept for history.
    Retired,
}

/// A rated individual or asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub role: Role,
    /// Weak reference to the owning team, if any.
    pub team: Option<TeamName>,
    pub ratings: Ratings,
    /// Age in years.
    pub age: u32,
    /// Ticks spent on an active roster.
    pub experience: u32,
    pub status: EntityStatus,
    /// Rostered but open to offers.
    pub available: bool,
    /// Salary per season.
    pub salary: Decimal,
    /// Last season covered by the current contract.
    pub contract_until: Option<u32>,
}

impl Entity {
    /// Derived capabilities (recomputed on every call).
    pub fn capabilities(&self) -> Capabilities {
        self.ratings.capabilities()
    }

    /// Overall rating across all dimensions.
    pub fn overall(&self) -> f32 {
        self.ratings.overall()
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    /// Active, tradeable and either unsigned or flagged available.
    pub fn on_market(&self) -> bool {
        self.is_active() && self.role.is_tradeable() && (self.team.is_none() || self.available)
    }
}

/// Owner of every entity ever created. Retired entities stay in the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unsigned entity from seed ratings; unspecified dimensions
    /// start at `baseline`.
    pub fn create(
        &mut self,
        role: Role,
        name: &str,
        age: u32,
        seed_ratings: &[(&str, f32)],
        baseline: f32,
    ) -> Result<EntityId, SimError> {
        if name.trim().is_empty() {
            return Err(SimError::InvalidInput("entity name must not be empty".into()));
        }
        let ratings = Ratings::from_pairs(role, seed_ratings, baseline)?;
        Ok(self.insert_with(role, name, age, ratings))
    }

    /// Insert a pre-built rating vector.
    pub fn insert_with(&mut self, role: Role, name: &str, age: u32, ratings: Ratings) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.entities.insert(
            id,
            Entity {
                id,
                name: name.to_string(),
                role,
                team: None,
                ratings,
                age,
                experience: 0,
                status: EntityStatus::Active,
                available: false,
                salary: Decimal::ZERO,
                contract_until: None,
            },
        );
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Lookup that reports a missing id as an error.
    pub fn require(&self, id: EntityId) -> Result<&Entity, SimError> {
        self.entities.get(&id).ok_or(SimError::UnknownEntity(id))
    }

    /// Apply rating deltas (clamped) and return the updated snapshot.
    pub fn apply_delta(&mut self, id: EntityId, deltas: &[(&str, f32)]) -> Result<Entity, SimError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(SimError::UnknownEntity(id))?;
        if !entity.is_active() {
            return Err(SimError::EntityRetired(id));
        }
        entity.ratings.apply_delta(deltas)?;
        Ok(entity.clone())
    }

    /// Remove from the active pool; the record is retained.
    pub fn retire(&mut self, id: EntityId) -> Result<(), SimError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(SimError::UnknownEntity(id))?;
        entity.status = EntityStatus::Retired;
        entity.team = None;
        entity.available = false;
        entity.contract_until = None;
        debug!(%id, name = %entity.name, role = %entity.role, "entity retired");
        Ok(())
    }

    /// Set or clear the owning team.
    pub fn assign(&mut self, id: EntityId, team: Option<TeamName>) -> Result<(), SimError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(SimError::UnknownEntity(id))?;
        entity.team = team;
        entity.available = false;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn active(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_active())
    }

    /// Entities currently signed to `team`.
    pub fn on_team<'a>(&'a self, team: &'a TeamName) -> impl Iterator<Item = &'a Entity> + 'a {
        self.active()
            .filter(move |e| e.team.as_ref() == Some(team))
    }

    /// First entity with the given display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.values().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Validate every stored rating vector.
    pub fn validate(&self) -> Result<(), SimError> {
        for e in self.entities.values() {
            e.ratings.validate()?;
            if e.ratings.role() != e.role {
                return Err(SimError::InvalidInput(format!(
                    "{} ratings do not match role {}",
                    e.name, e.role
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratings::{RATING_MAX, RATING_MIN};
    use proptest::prelude::*;

    #[test]
    fn create_and_apply_delta_returns_snapshot() {
        let mut store = EntityStore::new();
        let id = store
            .create(Role::Driver, "Lena Vogt", 22, &[("pace", 70.0)], 50.0)
            .unwrap();
        let snap = store.apply_delta(id, &[("pace", 45.0)]).unwrap();
        assert_eq!(snap.ratings.value("pace"), RATING_MAX);
        assert_eq!(store.get(id).unwrap().ratings.value("pace"), RATING_MAX);
    }

    #[test]
    fn retire_keeps_record_but_blocks_growth() {
        let mut store = EntityStore::new();
        let id = store.create(Role::Mechanic, "Ollie Marsh", 40, &[], 55.0).unwrap();
        store.assign(id, Some(TeamName::from("Apex Racing"))).unwrap();
        store.retire(id).unwrap();
        let e = store.get(id).unwrap();
        assert_eq!(e.status, EntityStatus::Retired);
        assert!(e.team.is_none());
        assert_eq!(store.active().count(), 0);
        assert!(matches!(
            store.apply_delta(id, &[("precision", 1.0)]),
            Err(SimError::EntityRetired(_))
        ));
    }

    #[test]
    fn malformed_create_is_rejected() {
        let mut store = EntityStore::new();
        assert!(store.create(Role::Driver, " ", 20, &[], 50.0).is_err());
        assert!(store
            .create(Role::Driver, "X", 20, &[("downforce", 50.0)], 50.0)
            .is_err());
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn ratings_stay_bounded(steps in proptest::collection::vec((0usize..20, -80.0f32..80.0), 1..200)) {
            let mut store = EntityStore::new();
            let id = store.create(Role::Strategist, "S", 35, &[], 50.0).unwrap();
            let dims = Role::Strategist.dimensions();
            for (i, d) in steps {
                let snap = store.apply_delta(id, &[(dims[i], d)]).unwrap();
                for (_, v) in snap.ratings.iter() {
                    prop_assert!((RATING_MIN..=RATING_MAX).contains(&v));
                }
            }
        }
    }
}
