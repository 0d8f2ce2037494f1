#![deny(warnings)]

//! ECS runtime for the league simulation.
//!
//! The authoritative state lives in a `bevy_ecs` [`World`](bevy_ecs::world::World)
//! as resources and is advanced by a single chained schedule, one tick per
//! run. Everything outside the engine observes through the event bus and the
//! read-only [`QuerySurface`].

pub mod bus;
pub mod config;
pub mod engine;
pub mod growth;
pub mod history;
pub mod market;
pub mod query;
pub mod race;
pub mod records;
pub mod setup;
pub mod snapshot;
pub mod standings;
pub mod state;
mod systems;

use rust_decimal::Decimal;
use sim_core::{EntityId, Role, SimError, TeamName, ValidationError};
use sim_econ::EconError;
use thiserror::Error;

pub use bus::{
    consumer_for, AnalyticsTally, ConsumerKind, ConsumerRegistry, EventConsumer, EventReader,
    NarrationFeed, SimEventBus, Subscription, TraceLog,
};
pub use config::{from_yaml_str, load_league_config};
pub use engine::{SimulationEngine, TickSummary};
pub use history::{ContextPacket, HistoricalTracker, SeasonStanding, SeasonSummary};
pub use market::{Candidate, CandidateFilter, Transfer};
pub use query::QuerySurface;
pub use sim_core::records::RecordFilter;
pub use race::{resolve_race, Classification, Entrant, RaceInput, RaceResult};
pub use records::RecordBook;
pub use snapshot::LeagueSnapshot;
pub use state::{Clock, League, TeamState};

/// Job market failures. The market is left exactly as it was.
#[derive(Debug, Error, PartialEq)]
pub enum MarketError {
    /// The offer fell short of what the entity accepts.
    #[error("offer rejected: asking {asking}, offered {offered}")]
    OfferRejected { asking: Decimal, offered: Decimal },
    /// The team has no vacancy for the role.
    #[error("{team} has no opening for a {role}")]
    NoOpening { team: TeamName, role: Role },
    /// The entity is not on the market.
    #[error("entity {0} is not available")]
    NotAvailable(EntityId),
    #[error(transparent)]
    Econ(#[from] EconError),
    #[error(transparent)]
    Core(#[from] SimError),
}

/// Startup configuration failures; fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
    #[error("generating league: {0}")]
    Setup(#[from] SimError),
}
