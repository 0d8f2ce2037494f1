//! League configuration loading.

use std::fs;
use std::path::Path;

use sim_core::{validate_config, LeagueConfig};
use tracing::info;

use crate::ConfigError;

/// Parse and validate a YAML league definition. Omitted sections take
/// their defaults.
pub fn from_yaml_str(text: &str) -> Result<LeagueConfig, ConfigError> {
    let config: LeagueConfig = serde_yaml::from_str(text)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_league_config(path: impl AsRef<Path>) -> Result<LeagueConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let config = from_yaml_str(&text)?;
    info!(path = %path.display(), league = %config.league_id, teams = config.teams.len(), "league config loaded");
    Ok(config)
}
