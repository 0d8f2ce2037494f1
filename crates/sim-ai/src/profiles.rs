//! Named tendency profiles for AI principals, loaded from YAML.
//!
//! ```yaml
//! profiles:
//!   aggressive: { standing: 1.6, cost_efficiency: 0.2, roster_need: 1.0, reserve_ratio: 0.1 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sim_core::{validate_tendencies, Tendencies, ValidationError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    profiles: BTreeMap<String, Tendencies>,
}

/// Parse and validate a profile catalogue.
pub fn profiles_from_yaml(text: &str) -> Result<BTreeMap<String, Tendencies>> {
    let file: ProfileFile = serde_yaml::from_str(text).context("parsing principal profiles")?;
    for (name, t) in &file.profiles {
        validate_tendencies(t).with_context(|| format!("profile {name}"))?;
    }
    Ok(file.profiles)
}

/// Read a profile catalogue from disk.
pub fn load_profiles(path: &Path) -> Result<BTreeMap<String, Tendencies>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    profiles_from_yaml(&text)
}

/// Tendencies for a named profile.
pub fn lookup<'a>(
    profiles: &'a BTreeMap<String, Tendencies>,
    name: &str,
) -> Result<&'a Tendencies, ValidationError> {
    profiles
        .get(name)
        .ok_or_else(|| ValidationError::UnknownProfile(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = r#"
profiles:
  aggressive: { standing: 1.6, cost_efficiency: 0.2, roster_need: 1.0, reserve_ratio: 0.1 }
  frugal:
    standing: 0.6
    cost_efficiency: 1.2
    roster_need: 1.2
"#;

    #[test]
    fn parses_and_defaults_reserve() {
        let p = profiles_from_yaml(CATALOGUE).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(lookup(&p, "frugal").unwrap().reserve_ratio, 0.0);
        assert_eq!(
            lookup(&p, "timid"),
            Err(ValidationError::UnknownProfile("timid".into()))
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_weights() {
        assert!(profiles_from_yaml("profiles:\n  x: { standing: 1, cost_efficiency: 1, roster_need: 1, greed: 3 }\n").is_err());
        assert!(profiles_from_yaml("profiles:\n  x: { standing: -1, cost_efficiency: 1, roster_need: 1 }\n").is_err());
        assert!(profiles_from_yaml("teams: []\n").is_err());
    }
}
