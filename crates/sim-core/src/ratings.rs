//! Role rating tables and derived capabilities.
//!
//! Every role carries a fixed, ordered set of named rating dimensions. Values
//! live in [`RATING_MIN`, `RATING_MAX`]; every mutation clamps.

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Lowest storable rating value.
pub const RATING_MIN: f32 = 0.0;
/// Highest storable rating value.
pub const RATING_MAX: f32 = 100.0;

/// Kinds of rated entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Races the car; the team's scoring entrant.
    Driver,
    /// Develops the car between races.
    Engineer,
    /// Prepares the car and works pit stops.
    Mechanic,
    /// Calls race strategy.
    Strategist,
    /// Decision-making authority of an AI-controlled team.
    Principal,
    /// The car itself, owned by a team but never traded.
    Car,
}

impl Role {
    /// All roles in declaration order.
    pub const ALL: [Role; 6] = [
        Role::Driver,
        Role::Engineer,
        Role::Mechanic,
        Role::Strategist,
        Role::Principal,
        Role::Car,
    ];

    /// Ordered dimension names for this role.
    pub fn dimensions(self) -> &'static [&'static str] {
        match self {
            Role::Driver => DRIVER_DIMENSIONS,
            Role::Engineer => ENGINEER_DIMENSIONS,
            Role::Mechanic => MECHANIC_DIMENSIONS,
            Role::Strategist => STRATEGIST_DIMENSIONS,
            Role::Principal => PRINCIPAL_DIMENSIONS,
            Role::Car => CAR_DIMENSIONS,
        }
    }

    /// Position of `dim` in this role's table.
    pub fn dimension_index(self, dim: &str) -> Option<usize> {
        self.dimensions().iter().position(|d| *d == dim)
    }

    /// Stable lowercase name, as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Engineer => "engineer",
            Role::Mechanic => "mechanic",
            Role::Strategist => "strategist",
            Role::Principal => "principal",
            Role::Car => "car",
        }
    }

    /// Whether entities of this role move through the job market.
    pub fn is_tradeable(self) -> bool {
        !matches!(self, Role::Car | Role::Principal)
    }

    /// Whether entities of this role age and retire.
    pub fn ages(self) -> bool {
        self != Role::Car
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const DRIVER_DIMENSIONS: &[&str] = &[
    "pace",
    "consistency",
    "racecraft",
    "qualifying",
    "overtaking",
    "defending",
    "tyre_management",
    "fuel_saving",
    "wet_weather",
    "starts",
    "focus",
    "composure",
    "aggression",
    "adaptability",
    "technical_feedback",
    "fitness",
    "stamina",
    "confidence",
    "discipline",
    "marketability",
];

const ENGINEER_DIMENSIONS: &[&str] = &[
    "aerodynamics",
    "chassis_design",
    "powertrain",
    "simulation",
    "data_analysis",
    "innovation",
    "setup_skill",
    "correlation",
    "reliability_focus",
    "cost_control",
    "leadership",
    "communication",
    "wind_tunnel",
    "cfd",
    "materials",
    "vehicle_dynamics",
    "tyre_modelling",
    "attention_to_detail",
    "work_rate",
    "development_speed",
];

const MECHANIC_DIMENSIONS: &[&str] = &[
    "pit_stop_speed",
    "precision",
    "reliability_prep",
    "gearbox_work",
    "engine_assembly",
    "hydraulics",
    "electronics",
    "bodywork",
    "teamwork",
    "composure",
    "stamina",
    "diagnostics",
    "tool_handling",
    "tyre_change",
    "jacking",
    "wheel_gun",
    "fault_finding",
    "preparation",
    "work_rate",
    "consistency",
];

const STRATEGIST_DIMENSIONS: &[&str] = &[
    "race_reading",
    "tyre_strategy",
    "pit_timing",
    "weather_calls",
    "risk_judgement",
    "data_analysis",
    "communication",
    "adaptability",
    "calm_under_pressure",
    "fuel_strategy",
    "undercut_sense",
    "safety_car_response",
    "rival_modelling",
    "tyre_allocation",
    "qualifying_planning",
    "simulation",
    "decisiveness",
    "creativity",
    "foresight",
    "consistency",
];

const PRINCIPAL_DIMENSIONS: &[&str] = &[
    "leadership",
    "negotiation",
    "financial_acumen",
    "vision",
    "politics",
    "talent_spotting",
    "media_handling",
    "patience",
    "risk_tolerance",
    "motivation",
    "discipline",
    "delegation",
    "sponsor_relations",
    "crisis_management",
    "technical_literacy",
    "loyalty",
    "ambition",
    "adaptability",
    "reputation",
    "composure",
];

const CAR_DIMENSIONS: &[&str] = &[
    "power_unit",
    "aero_efficiency",
    "downforce",
    "drag_efficiency",
    "mechanical_grip",
    "braking",
    "cooling",
    "reliability",
    "tyre_wear",
    "weight",
    "balance",
    "traction",
    "top_speed",
    "cornering",
    "energy_recovery",
    "fuel_efficiency",
    "suspension",
    "gearbox",
    "chassis_stiffness",
    "development_potential",
];

fn clamp_rating(v: f32) -> f32 {
    v.clamp(RATING_MIN, RATING_MAX)
}

/// Fixed-size ordered rating vector for one role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ratings {
    role: Role,
    values: Vec<f32>,
}

impl Ratings {
    /// Every dimension set to `value` (clamped).
    pub fn uniform(role: Role, value: f32) -> Self {
        let v = if value.is_finite() { clamp_rating(value) } else { RATING_MIN };
        Self {
            role,
            values: vec![v; role.dimensions().len()],
        }
    }

    /// Build from named seed values; unspecified dimensions take `baseline`.
    ///
    /// Unknown names fail with [`SimError::UnknownRating`]; non-finite values
    /// fail with [`SimError::InvalidInput`]. Out-of-range values are clamped.
    pub fn from_pairs(role: Role, pairs: &[(&str, f32)], baseline: f32) -> Result<Self, SimError> {
        let mut r = Self::uniform(role, baseline);
        for (name, value) in pairs {
            let idx = role
                .dimension_index(name)
                .ok_or_else(|| SimError::UnknownRating {
                    role,
                    dimension: (*name).to_string(),
                })?;
            if !value.is_finite() {
                return Err(SimError::InvalidInput(format!("rating {name} is not finite")));
            }
            r.values[idx] = clamp_rating(*value);
        }
        Ok(r)
    }

    /// Role this vector belongs to.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Named lookup.
    pub fn get(&self, dim: &str) -> Result<f32, SimError> {
        self.role
            .dimension_index(dim)
            .map(|i| self.values[i])
            .ok_or_else(|| SimError::UnknownRating {
                role: self.role,
                dimension: dim.to_string(),
            })
    }

    /// Named lookup returning [`RATING_MIN`] for names outside the table.
    pub fn value(&self, dim: &str) -> f32 {
        self.get(dim).unwrap_or(RATING_MIN)
    }

    /// Iterate `(dimension, value)` in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.role
            .dimensions()
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// Apply named deltas, clamping each result into bounds.
    ///
    /// All names are checked before anything changes, so a malformed batch
    /// leaves the vector untouched.
    pub fn apply_delta(&mut self, deltas: &[(&str, f32)]) -> Result<(), SimError> {
        let mut resolved = Vec::with_capacity(deltas.len());
        for (name, delta) in deltas {
            let idx = self
                .role
                .dimension_index(name)
                .ok_or_else(|| SimError::UnknownRating {
                    role: self.role,
                    dimension: (*name).to_string(),
                })?;
            if !delta.is_finite() {
                return Err(SimError::InvalidInput(format!("delta for {name} is not finite")));
            }
            resolved.push((idx, *delta));
        }
        for (idx, delta) in resolved {
            self.values[idx] = clamp_rating(self.values[idx] + delta);
        }
        Ok(())
    }

    /// Add the same delta to every dimension (clamped). Non-finite deltas are ignored.
    pub fn shift_all(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        for v in &mut self.values {
            *v = clamp_rating(*v + delta);
        }
    }

    /// Unweighted mean of all dimensions.
    pub fn overall(&self) -> f32 {
        if self.values.is_empty() {
            return RATING_MIN;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// Check length against the role table and every value against bounds.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.values.len() != self.role.dimensions().len() {
            return Err(SimError::InvalidInput(format!(
                "{} ratings must have {} dimensions",
                self.role,
                self.role.dimensions().len()
            )));
        }
        if self
            .values
            .iter()
            .any(|v| !v.is_finite() || *v < RATING_MIN || *v > RATING_MAX)
        {
            return Err(SimError::InvalidInput("rating outside bounds".into()));
        }
        Ok(())
    }

    fn weighted(&self, parts: &[(&str, f32)]) -> f32 {
        let total: f32 = parts.iter().map(|(_, w)| *w).sum();
        if total <= 0.0 {
            return RATING_MIN;
        }
        parts.iter().map(|(d, w)| self.value(d) * w).sum::<f32>() / total
    }

    /// Role-specific derived capabilities. Always recomputed, never stored.
    pub fn capabilities(&self) -> Capabilities {
        match self.role {
            Role::Driver => Capabilities::Driver {
                pace: self.value("pace"),
                consistency: self.value("consistency"),
                racecraft: self.weighted(&[
                    ("racecraft", 0.6),
                    ("overtaking", 0.2),
                    ("defending", 0.2),
                ]),
                qualifying: self.weighted(&[("qualifying", 0.7), ("pace", 0.3)]),
            },
            Role::Engineer => Capabilities::Engineer {
                development_rate: self.weighted(&[
                    ("development_speed", 0.3),
                    ("aerodynamics", 0.2),
                    ("innovation", 0.2),
                    ("cfd", 0.15),
                    ("wind_tunnel", 0.15),
                ]),
                setup_bonus: self.weighted(&[
                    ("setup_skill", 0.5),
                    ("vehicle_dynamics", 0.3),
                    ("data_analysis", 0.2),
                ]),
            },
            Role::Mechanic => Capabilities::Mechanic {
                pit_efficiency: self.weighted(&[
                    ("pit_stop_speed", 0.4),
                    ("tyre_change", 0.2),
                    ("wheel_gun", 0.2),
                    ("teamwork", 0.2),
                ]),
                reliability_prep: self.weighted(&[
                    ("reliability_prep", 0.5),
                    ("precision", 0.25),
                    ("fault_finding", 0.25),
                ]),
            },
            Role::Strategist => Capabilities::Strategist {
                strategy: self.weighted(&[
                    ("race_reading", 0.3),
                    ("tyre_strategy", 0.25),
                    ("pit_timing", 0.25),
                    ("weather_calls", 0.2),
                ]),
            },
            Role::Principal => Capabilities::Principal {
                negotiation: self.weighted(&[("negotiation", 0.6), ("politics", 0.4)]),
                commercial: self.weighted(&[
                    ("sponsor_relations", 0.5),
                    ("financial_acumen", 0.3),
                    ("media_handling", 0.2),
                ]),
            },
            Role::Car => Capabilities::Car {
                performance: self.weighted(&[
                    ("power_unit", 0.2),
                    ("aero_efficiency", 0.2),
                    ("downforce", 0.15),
                    ("mechanical_grip", 0.15),
                    ("cornering", 0.1),
                    ("top_speed", 0.1),
                    ("balance", 0.1),
                ]),
                reliability: self.weighted(&[
                    ("reliability", 0.6),
                    ("cooling", 0.2),
                    ("gearbox", 0.2),
                ]),
            },
        }
    }
}

/// Derived, role-specific capability scores on the rating scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Capabilities {
    Driver {
        pace: f32,
        consistency: f32,
        racecraft: f32,
        qualifying: f32,
    },
    Engineer {
        development_rate: f32,
        setup_bonus: f32,
    },
    Mechanic {
        pit_efficiency: f32,
        reliability_prep: f32,
    },
    Strategist {
        strategy: f32,
    },
    Principal {
        negotiation: f32,
        commercial: f32,
    },
    Car {
        performance: f32,
        reliability: f32,
    },
}

impl Capabilities {
    /// Single contribution score used by standings and the AI.
    pub fn contribution(&self) -> f32 {
        match *self {
            Capabilities::Driver {
                pace,
                consistency,
                racecraft,
                qualifying,
            } => 0.4 * pace + 0.25 * consistency + 0.2 * racecraft + 0.15 * qualifying,
            Capabilities::Engineer {
                development_rate,
                setup_bonus,
            } => 0.6 * development_rate + 0.4 * setup_bonus,
            Capabilities::Mechanic {
                pit_efficiency,
                reliability_prep,
            } => 0.5 * pit_efficiency + 0.5 * reliability_prep,
            Capabilities::Strategist { strategy } => strategy,
            Capabilities::Principal {
                negotiation,
                commercial,
            } => 0.5 * negotiation + 0.5 * commercial,
            Capabilities::Car {
                performance,
                reliability,
            } => 0.75 * performance + 0.25 * reliability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn every_role_has_twenty_unique_dimensions() {
        for role in Role::ALL {
            let dims = role.dimensions();
            assert_eq!(dims.len(), 20, "{role}");
            let mut sorted = dims.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), dims.len(), "{role} has duplicate names");
        }
    }

    #[test]
    fn unknown_dimension_is_rejected_without_change() {
        let mut r = Ratings::uniform(Role::Driver, 50.0);
        let before = r.clone();
        let err = r
            .apply_delta(&[("pace", 5.0), ("warp_drive", 1.0)])
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownRating { .. }));
        assert_eq!(r, before);
    }

    #[test]
    fn seed_values_are_clamped() {
        let r = Ratings::from_pairs(Role::Car, &[("reliability", 140.0), ("weight", -3.0)], 50.0)
            .unwrap();
        assert_eq!(r.value("reliability"), RATING_MAX);
        assert_eq!(r.value("weight"), RATING_MIN);
        assert_eq!(r.value("downforce"), 50.0);
    }

    #[test]
    fn driver_capabilities_follow_core_ratings() {
        let r = Ratings::from_pairs(
            Role::Driver,
            &[("pace", 80.0), ("consistency", 90.0), ("racecraft", 70.0)],
            50.0,
        )
        .unwrap();
        match r.capabilities() {
            Capabilities::Driver {
                pace, consistency, ..
            } => {
                assert_eq!(pace, 80.0);
                assert_eq!(consistency, 90.0);
            }
            other => panic!("unexpected capabilities {other:?}"),
        }
    }

    #[test]
    fn capability_formulas_only_read_known_dimensions() {
        // A maxed vector must produce maxed capabilities; any misspelt
        // dimension would read as zero and drag the score down.
        for role in Role::ALL {
            let c = Ratings::uniform(role, RATING_MAX).capabilities();
            assert!((c.contribution() - RATING_MAX).abs() < 1e-3, "{role}");
        }
    }

    proptest! {
        #[test]
        fn deltas_never_escape_bounds(deltas in proptest::collection::vec(-500.0f32..500.0, 1..60)) {
            let mut r = Ratings::uniform(Role::Mechanic, 50.0);
            let dims = Role::Mechanic.dimensions();
            for (i, d) in deltas.iter().enumerate() {
                r.apply_delta(&[(dims[i % dims.len()], *d)]).unwrap();
                r.shift_all(*d / 10.0);
            }
            prop_assert!(r.validate().is_ok());
        }
    }
}
