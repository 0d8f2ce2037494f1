//! Seeded league generation: rosters per team tier, a free-agent pool and
//! the yearly rookie intake.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::Rng;
use sim_ai::DecisionPolicy;
use sim_core::config::TeamConfig;
use sim_core::{
    stream_rng, validate_config, Control, EntityId, EntityStore, LeagueConfig, Ratings, Role,
    SimError, Stream, Team, TeamName,
};
use sim_econ::{asking_salary, Ledger, OverdraftPolicy};
use tracing::{debug, info};

use crate::state::{League, TeamState};
use crate::ConfigError;

const FIRST_NAMES: &[&str] = &[
    "Lena", "Rui", "Mateo", "Ines", "Kai", "Noor", "Elias", "Sana", "Theo", "Maya", "Jonas",
    "Aiko", "Luca", "Freya", "Omar", "Clara", "Nils", "Zara", "Felix", "Ava", "Dario", "Ilse",
    "Tomas", "Yara", "Hugo", "Mina", "Pavel", "Lotte", "Arjun", "Elena",
];

const LAST_NAMES: &[&str] = &[
    "Vogt", "Tanaka", "Moreau", "Castillo", "Lindqvist", "Okafor", "Brennan", "Petrov", "Rossi",
    "Haddad", "Novak", "Sato", "Kowalski", "Ferreira", "Albers", "Quinn", "Marsh", "Duval",
    "Ibarra", "Keller", "Nakamura", "Silva", "Varga", "Holm", "Reyes", "Marchetti", "Ahmed",
    "Berg", "Costa", "Lambert",
];

/// Ratings spread around a baseline.
const RATING_SPREAD: f32 = 8.0;

fn age_range(role: Role) -> (u32, u32) {
    match role {
        Role::Driver => (19, 34),
        Role::Engineer => (30, 55),
        Role::Mechanic => (24, 45),
        Role::Strategist => (28, 52),
        Role::Principal => (40, 62),
        Role::Car => (0, 0),
    }
}

fn unique_name<R: Rng>(rng: &mut R, used: &mut BTreeSet<String>) -> String {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Alex");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Morgan");
    let base = format!("{first} {last}");
    let mut name = base.clone();
    let mut n = 2;
    while used.contains(&name) {
        name = format!("{base} {n}");
        n += 1;
    }
    used.insert(name.clone());
    name
}

fn spread_ratings<R: Rng>(rng: &mut R, role: Role, baseline: f32) -> Result<Ratings, SimError> {
    let pairs: Vec<(&str, f32)> = role
        .dimensions()
        .iter()
        .map(|d| (*d, baseline + rng.gen_range(-RATING_SPREAD..=RATING_SPREAD)))
        .collect();
    Ratings::from_pairs(role, &pairs, baseline)
}

fn spawn_person<R: Rng>(
    rng: &mut R,
    store: &mut EntityStore,
    used: &mut BTreeSet<String>,
    role: Role,
    baseline: f32,
) -> Result<EntityId, SimError> {
    let (lo, hi) = age_range(role);
    let age = rng.gen_range(lo..=hi);
    let name = unique_name(rng, used);
    let ratings = spread_ratings(rng, role, baseline)?;
    Ok(store.insert_with(role, &name, age, ratings))
}

fn tier_baseline(tier: u8) -> f32 {
    40.0 + 6.0 * tier as f32
}

fn seed_team<R: Rng>(
    rng: &mut R,
    cfg: &LeagueConfig,
    team_cfg: &TeamConfig,
    store: &mut EntityStore,
    used: &mut BTreeSet<String>,
) -> Result<TeamState, SimError> {
    let name = TeamName::from(team_cfg.name.as_str());
    let mut team = Team::new(name.clone(), team_cfg.control.clone());
    let baseline = tier_baseline(team_cfg.tier);
    let req = &cfg.market.requirements;
    let tiers = &cfg.market.salary_per_tier;

    let sign = |store: &mut EntityStore, id: EntityId, rng: &mut R| -> Result<(), SimError> {
        store.assign(id, Some(name.clone()))?;
        if let Some(e) = store.get_mut(id) {
            if e.role.is_tradeable() {
                e.salary = asking_salary(e.overall(), tiers);
                e.contract_until = Some(rng.gen_range(1..=cfg.market.contract_seasons.max(1)));
            }
        }
        Ok(())
    };

    for role in Role::ALL.into_iter().filter(|r| r.is_tradeable()) {
        for _ in 0..req.required(role) {
            let jitter = rng.gen_range(-3.0..=3.0);
            let id = spawn_person(rng, store, used, role, baseline + jitter)?;
            sign(store, id, rng)?;
            team.roster.insert(id);
        }
    }
    let car_name = format!("{} car", team_cfg.name);
    let car = store.insert_with(Role::Car, &car_name, 0, spread_ratings(rng, Role::Car, baseline)?);
    sign(store, car, rng)?;
    team.roster.insert(car);

    if let Control::Ai { .. } = team_cfg.control {
        let principal = spawn_person(rng, store, used, Role::Principal, baseline)?;
        sign(store, principal, rng)?;
        team.principal = Some(principal);
    }

    let ledger = Ledger::with_opening_balance(
        OverdraftPolicy::from_config(&cfg.economy),
        0,
        team_cfg.starting_balance,
    )
    .map_err(|e| SimError::InvalidInput(format!("team {name}: {e}")))?;
    debug!(team = %name, tier = team_cfg.tier, roster = team.roster.len(), "team seeded");
    Ok(TeamState::new(team, ledger, team_cfg.tier))
}

/// Free agents seeded alongside the teams.
fn free_agent_pool(teams: usize) -> [(Role, usize); 4] {
    let n = teams.max(2);
    [
        (Role::Driver, n),
        (Role::Engineer, n / 2),
        (Role::Mechanic, n / 2),
        (Role::Strategist, n / 2),
    ]
}

/// Validate the configuration and generate the starting league.
pub fn build_league(config: LeagueConfig) -> Result<League, ConfigError> {
    validate_config(&config)?;
    let mut rng = stream_rng(config.seed, 0, 0, Stream::Setup);
    let mut store = EntityStore::new();
    let mut used = BTreeSet::new();
    let mut teams = BTreeMap::new();
    for team_cfg in &config.teams {
        let state = seed_team(&mut rng, &config, team_cfg, &mut store, &mut used)?;
        teams.insert(state.name().clone(), state);
    }
    for (role, count) in free_agent_pool(config.teams.len()) {
        for _ in 0..count {
            let baseline = rng.gen_range(35.0..=62.0);
            spawn_person(&mut rng, &mut store, &mut used, role, baseline)?;
        }
    }
    info!(
        league = %config.league_id,
        teams = teams.len(),
        entities = store.len(),
        "league generated"
    );
    Ok(League {
        config,
        entities: store,
        teams,
        policy: DecisionPolicy::default(),
    })
}

/// Young entrants joining the market at the end of `season`.
pub fn spawn_rookies(league: &mut League, season: u32, tick: u64) -> Result<Vec<EntityId>, SimError> {
    let mut rng = stream_rng(league.config.seed, season, tick, Stream::Market);
    let mut used: BTreeSet<String> = league.entities.iter().map(|e| e.name.clone()).collect();
    let roles = [Role::Driver, Role::Driver, Role::Engineer, Role::Mechanic, Role::Strategist];
    let mut out = Vec::new();
    for i in 0..league.config.market.rookies_per_season as usize {
        let role = roles[i % roles.len()];
        let baseline = rng.gen_range(32.0..=58.0);
        let id = spawn_person(&mut rng, &mut league.entities, &mut used, role, baseline)?;
        if let Some(e) = league.entities.get_mut(id) {
            e.age = age_range(role).0 + rng.gen_range(0..=3);
        }
        out.push(id);
    }
    debug!(season, rookies = out.len(), "rookie intake");
    Ok(out)
}
