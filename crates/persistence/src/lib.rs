#![deny(warnings)]

//! Persistence layer: SQLite schema, between-tick flushes of the record
//! book, persisted read-only queries and save snapshots.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sim_core::SimError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

mod store;

pub use store::{SqliteStore, StoredSnapshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The store could not be opened or reached.
    #[error("persisted store unavailable: {0}")]
    MissingDependency(String),
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Filter(#[from] SimError),
}

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/main.db"
}

/// Open (creating if needed) the database at `url` and run migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| PersistenceError::MissingDependency(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(|e| PersistenceError::MissingDependency(e.to_string()))?;
    migrate(&pool).await?;
    info!(%url, "database ready");
    Ok(pool)
}

pub(crate) async fn migrate(pool: &SqlitePool) -> Result<(), PersistenceError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Register a save slot and return its id.
pub async fn create_save(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
) -> Result<i64, PersistenceError> {
    let done = sqlx::query("INSERT INTO saves (name, description) VALUES (?, ?)")
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    Ok(done.last_insert_rowid())
}

/// Money is stored as integer cents, rounded half away from zero.
pub fn decimal_to_cents_i64(amount: Decimal) -> Result<i64, PersistenceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| PersistenceError::Encode(format!("{amount} does not fit in cents")))
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn encode_snapshot<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(value).map_err(|e| PersistenceError::Encode(e.to_string()))
}

pub fn decode_snapshot<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|e| PersistenceError::Encode(e.to_string()))
}
