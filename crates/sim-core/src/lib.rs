#![deny(warnings)]

//! Core domain models and invariants for the league simulator.
//!
//! This crate defines the serializable entity model (roles, rating tables,
//! entities, rosters), the configuration schema with its validation, the
//! published event schema and the persisted logical-schema rows.

pub mod config;
pub mod entity;
pub mod event;
pub mod ratings;
pub mod records;
pub mod roster;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

pub use config::{validate_config, validate_tendencies, LeagueConfig, Tendencies};
pub use entity::{Entity, EntityId, EntityStatus, EntityStore, TeamName};
pub use event::{SimEvent, SimEventKind};
pub use ratings::{Capabilities, Ratings, Role, RATING_MAX, RATING_MIN};
pub use roster::{weighted_contribution, Control, RoleSlot, RosterRequirements, Team, TeamStatus};

/// Recoverable simulation errors: the request is rejected, state is untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Malformed request or query filter.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Rating dimension not present in the role's table.
    #[error("unknown {role} rating dimension: {dimension}")]
    UnknownRating { role: Role, dimension: String },
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("unknown team {0}")]
    UnknownTeam(String),
    /// Operation needs an active entity.
    #[error("entity {0} is retired")]
    EntityRetired(EntityId),
}

/// Configuration errors; fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} must be finite")]
    NonFinite(&'static str),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
    #[error("{0} must not be negative")]
    NegativeMoney(&'static str),
    #[error("duplicate team name: {0}")]
    DuplicateTeam(String),
    #[error("unknown principal profile: {0}")]
    UnknownProfile(String),
}

/// Purposes for derived random streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Setup = 1,
    Qualifying = 2,
    Race = 3,
    Growth = 4,
    Sponsorship = 5,
    Market = 6,
}

/// Derive an independent, reproducible RNG for `(season, tick, purpose)`.
///
/// The same root seed and coordinates always give the same stream, so a
/// replay from identical state reproduces every draw.
pub fn stream_rng(seed: u64, season: u32, tick: u64, purpose: Stream) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(mix_seed(seed, season, tick, purpose as u64))
}

/// SplitMix64-style mixing of the stream coordinates.
pub fn mix_seed(seed: u64, season: u32, tick: u64, purpose: u64) -> u64 {
    let mut z = seed
        ^ (season as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ tick.wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ purpose.wrapping_mul(0x94D0_49BB_1331_11EB);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
