//! League configuration schema and startup validation.
//!
//! Every tunable constant of the simulation lives here under a named field.
//! Validation failures are fatal at startup and nowhere else.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ratings::Role;
use crate::roster::{Control, RosterRequirements};
use crate::ValidationError;

/// Top-level league configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeagueConfig {
    /// Identifier written into persisted standings.
    pub league_id: String,
    /// Root seed; every random stream is derived from it.
    pub seed: u64,
    #[serde(default)]
    pub season: SeasonConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub race: RaceConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub standings: StandingsConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub actions: ActionCosts,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Named AI tendency vectors.
    #[serde(default)]
    pub principals: BTreeMap<String, Tendencies>,
    pub teams: Vec<TeamConfig>,
}

/// Calendar and time scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonConfig {
    /// In-game date of tick zero.
    pub start_date: NaiveDate,
    /// In-game days per tick.
    pub days_per_tick: u16,
    /// A race is held every this many ticks.
    pub ticks_between_races: u32,
    /// Ordered track names; one race per track per season.
    pub tracks: Vec<String>,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap_or(NaiveDate::MIN),
            days_per_tick: 7,
            ticks_between_races: 2,
            tracks: [
                "Sakhir",
                "Albert Park",
                "Suzuka",
                "Imola",
                "Monaco",
                "Barcelona",
                "Silverstone",
                "Spa-Francorchamps",
                "Monza",
                "Marina Bay",
                "Interlagos",
                "Yas Marina",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl SeasonConfig {
    /// Ticks in one full season.
    pub fn ticks_per_season(&self) -> u64 {
        self.tracks.len() as u64 * self.ticks_between_races.max(1) as u64
    }
}

/// Points and prize money per finishing position (index 0 = winner).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub points: Vec<u32>,
    pub prize_money: Vec<Decimal>,
    /// Debited from a team that forfeits a race.
    pub forfeit_fine: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points: vec![25, 18, 15, 12, 10, 8, 6, 4, 2, 1],
            prize_money: [250_000, 180_000, 140_000, 110_000, 90_000, 70_000, 50_000, 40_000]
                .iter()
                .map(|v| Decimal::new(*v, 0))
                .collect(),
            forfeit_fine: Decimal::new(100_000, 0),
        }
    }
}

impl ScoringConfig {
    /// Points for a 1-based finishing position.
    pub fn points_for(&self, position: u32) -> u32 {
        position
            .checked_sub(1)
            .and_then(|i| self.points.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Prize money for a 1-based finishing position.
    pub fn prize_for(&self, position: u32) -> Decimal {
        position
            .checked_sub(1)
            .and_then(|i| self.prize_money.get(i as usize))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn max_points(&self) -> u32 {
        self.points.iter().copied().max().unwrap_or(0)
    }
}

/// Race performance formula.
///
/// `driver = pace_weight*pace + consistency_weight*consistency + racecraft_weight*racecraft`
/// (driver weights normalised to sum 1), then
/// `base = (driver_weight*driver + car_weight*car + crew_weight*crew) / (sum of the three)`,
/// `performance = base + u * perturbation * (1.5 - consistency/100)` with `u` uniform in [-1, 1].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub pace_weight: f32,
    pub consistency_weight: f32,
    pub racecraft_weight: f32,
    pub driver_weight: f32,
    pub car_weight: f32,
    pub crew_weight: f32,
    /// Amplitude of the random perturbation, in rating points.
    pub perturbation: f32,
    /// Retirement probability for an entrant with 50-rated car and crew reliability.
    pub dnf_base_chance: f32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            pace_weight: 0.5,
            consistency_weight: 0.3,
            racecraft_weight: 0.2,
            driver_weight: 0.5,
            car_weight: 0.35,
            crew_weight: 0.15,
            perturbation: 4.0,
            dnf_base_chance: 0.05,
        }
    }
}

/// Per-role ages in years.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleAges {
    pub driver: u32,
    pub engineer: u32,
    pub mechanic: u32,
    pub strategist: u32,
    pub principal: u32,
}

impl RoleAges {
    /// Age for a role; cars return `u32::MAX` (they never age).
    pub fn for_role(&self, role: Role) -> u32 {
        match role {
            Role::Driver => self.driver,
            Role::Engineer => self.engineer,
            Role::Mechanic => self.mechanic,
            Role::Strategist => self.strategist,
            Role::Principal => self.principal,
            Role::Car => u32::MAX,
        }
    }
}

impl Default for RoleAges {
    fn default() -> Self {
        Self {
            driver: 28,
            engineer: 45,
            mechanic: 38,
            strategist: 42,
            principal: 52,
        }
    }
}

/// Growth and decay of ratings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Rating points per tick at full youth or full decline.
    pub base_step: f32,
    /// Weight of recent form (in [-0.5, 0.5]) in the step.
    pub performance_weight: f32,
    /// Uniform noise amplitude added to each step factor.
    pub noise: f32,
    /// Absolute cap on any single-tick change.
    pub max_step: f32,
    /// Years over which youth growth and veteran decline ramp to full strength.
    pub age_ramp_years: f32,
    pub peak_age: RoleAges,
    pub retirement_age: RoleAges,
    /// Car gain per tick per point of engineer development rate above 50.
    pub car_development_rate: f32,
    /// Car loss per tick as rivals develop.
    pub car_obsolescence: f32,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            base_step: 0.12,
            performance_weight: 0.6,
            noise: 0.3,
            max_step: 1.0,
            age_ramp_years: 8.0,
            peak_age: RoleAges::default(),
            retirement_age: RoleAges {
                driver: 39,
                engineer: 66,
                mechanic: 58,
                strategist: 64,
                principal: 72,
            },
            car_development_rate: 0.01,
            car_obsolescence: 0.12,
        }
    }
}

/// Per-role weights used by standings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleWeights {
    pub driver: f32,
    pub car: f32,
    pub engineer: f32,
    pub mechanic: f32,
    pub strategist: f32,
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self {
            driver: 0.4,
            car: 0.3,
            engineer: 0.12,
            mechanic: 0.08,
            strategist: 0.1,
        }
    }
}

impl RoleWeights {
    pub fn for_role(&self, role: Role) -> f32 {
        match role {
            Role::Driver => self.driver,
            Role::Car => self.car,
            Role::Engineer => self.engineer,
            Role::Mechanic => self.mechanic,
            Role::Strategist => self.strategist,
            Role::Principal => 0.0,
        }
    }

    pub fn total(&self) -> f32 {
        self.driver + self.car + self.engineer + self.mechanic + self.strategist
    }
}

/// Standing metric: `scale * (results_share*recency_weighted_results + (1-results_share)*role_contribution)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StandingsConfig {
    /// Weight multiplier per race of age; in (0, 1].
    pub recency_decay: f32,
    /// Share of the metric coming from results; the rest from roster contribution.
    pub results_share: f32,
    /// Results older than this many races are ignored.
    pub window: usize,
    pub role_weights: RoleWeights,
    /// Upper end of the normalised scale.
    pub scale: f32,
}

impl Default for StandingsConfig {
    fn default() -> Self {
        Self {
            recency_decay: 0.8,
            results_share: 0.6,
            window: 12,
            role_weights: RoleWeights::default(),
            scale: 100.0,
        }
    }
}

/// Money flow and insolvency policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Discretionary spending may not push the balance below this.
    pub hard_floor: Decimal,
    /// Committed costs (payroll, operations, fines) may go this far below zero.
    pub overdraft_limit: Decimal,
    /// Crossing below this publishes a bankruptcy warning.
    pub warning_floor: Decimal,
    /// Ticks spent below this count towards insolvency.
    pub insolvency_floor: Decimal,
    /// Consecutive insolvent ticks tolerated before the team withdraws.
    pub insolvency_grace_ticks: u32,
    /// Sponsorship per tick at a standing of 50.
    pub sponsorship_base: Decimal,
    /// Multiplicative sponsorship noise fraction in [0, 1).
    pub sponsorship_noise: f32,
    /// Fixed running cost per tick.
    pub operating_cost: Decimal,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            hard_floor: Decimal::ZERO,
            overdraft_limit: Decimal::new(2_000_000, 0),
            warning_floor: Decimal::new(500_000, 0),
            insolvency_floor: Decimal::ZERO,
            insolvency_grace_ticks: 8,
            sponsorship_base: Decimal::new(300_000, 0),
            sponsorship_noise: 0.1,
            operating_cost: Decimal::new(60_000, 0),
        }
    }
}

/// Costs and effects of discretionary actions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionCosts {
    pub upgrade_cost: Decimal,
    /// Rating points added to one car dimension.
    pub upgrade_delta: f32,
    pub training_cost: Decimal,
    /// Rating points added to a driver's core dimensions.
    pub training_delta: f32,
    /// Share of a season salary paid when releasing someone.
    pub severance_fraction: Decimal,
}

impl Default for ActionCosts {
    fn default() -> Self {
        Self {
            upgrade_cost: Decimal::new(300_000, 0),
            upgrade_delta: 2.0,
            training_cost: Decimal::new(120_000, 0),
            training_delta: 0.25,
            severance_fraction: Decimal::new(5, 1),
        }
    }
}

/// Labour market rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// An offer is accepted when salary >= asking * acceptance_ratio.
    pub acceptance_ratio: Decimal,
    /// Asking season salary by rating tier (index 0 = overall below 20).
    pub salary_per_tier: Vec<Decimal>,
    /// Paid up front on signing, as a share of the offered salary.
    pub signing_fee_fraction: Decimal,
    /// Paid to the releasing team when buying out a contract, as a share of current salary.
    pub buyout_fraction: Decimal,
    pub contract_seasons: u32,
    pub rookies_per_season: u32,
    pub requirements: RosterRequirements,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            acceptance_ratio: Decimal::new(9, 1),
            salary_per_tier: [100_000, 250_000, 600_000, 1_200_000, 2_500_000]
                .iter()
                .map(|v| Decimal::new(*v, 0))
                .collect(),
            signing_fee_fraction: Decimal::new(25, 2),
            buyout_fraction: Decimal::new(1, 0),
            contract_seasons: 2,
            rookies_per_season: 4,
            requirements: RosterRequirements::default(),
        }
    }
}

/// Derived history tables and milestones.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Races considered by the pulse score.
    pub pulse_window: usize,
    pub win_rate_weight: f32,
    pub momentum_weight: f32,
    pub streak_weight: f32,
    /// Streak length at which the streak component saturates.
    pub streak_cap: u32,
    pub win_milestone_step: u32,
    pub podium_milestone_step: u32,
    pub race_milestone_step: u32,
    /// Milestones kept per team for context packets.
    pub recent_milestones: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            pulse_window: 6,
            win_rate_weight: 0.45,
            momentum_weight: 0.35,
            streak_weight: 0.2,
            streak_cap: 5,
            win_milestone_step: 10,
            podium_milestone_step: 25,
            race_milestone_step: 50,
            recent_milestones: 5,
        }
    }
}

/// Fixed-schema AI tendency vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tendencies {
    /// Weight on expected standing gain.
    pub standing: f32,
    /// Weight on cost efficiency.
    pub cost_efficiency: f32,
    /// Weight on filling roster gaps.
    pub roster_need: f32,
    /// Cushion kept out of discretionary spend, as a share of one season's
    /// committed costs, in [0, 1).
    #[serde(default)]
    pub reserve_ratio: f32,
}

impl Default for Tendencies {
    fn default() -> Self {
        Self {
            standing: 1.0,
            cost_efficiency: 0.5,
            roster_need: 1.0,
            reserve_ratio: 0.2,
        }
    }
}

/// Validate a tendency vector.
pub fn validate_tendencies(t: &Tendencies) -> Result<(), ValidationError> {
    for (field, v) in [
        ("tendencies.standing", t.standing),
        ("tendencies.cost_efficiency", t.cost_efficiency),
        ("tendencies.roster_need", t.roster_need),
    ] {
        if !v.is_finite() {
            return Err(ValidationError::NonFinite(field));
        }
        if v < 0.0 {
            return Err(ValidationError::OutOfRange(field));
        }
    }
    if t.standing + t.cost_efficiency + t.roster_need <= 0.0 {
        return Err(ValidationError::OutOfRange("tendencies (sum)"));
    }
    if !t.reserve_ratio.is_finite() || !(0.0..1.0).contains(&t.reserve_ratio) {
        return Err(ValidationError::OutOfRange("tendencies.reserve_ratio"));
    }
    Ok(())
}

/// One participating team.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub control: Control,
    pub starting_balance: Decimal,
    /// Strength tier 1 (weakest) to 5 (strongest) used to seed ratings.
    #[serde(default = "default_tier")]
    pub tier: u8,
}

fn default_tier() -> u8 {
    3
}

impl Default for LeagueConfig {
    fn default() -> Self {
        let mut principals = BTreeMap::new();
        principals.insert(
            "aggressive".to_string(),
            Tendencies {
                standing: 1.6,
                cost_efficiency: 0.2,
                roster_need: 1.0,
                reserve_ratio: 0.1,
            },
        );
        principals.insert("balanced".to_string(), Tendencies::default());
        principals.insert(
            "frugal".to_string(),
            Tendencies {
                standing: 0.6,
                cost_efficiency: 1.2,
                roster_need: 1.2,
                reserve_ratio: 0.4,
            },
        );
        let ai = |profile: &str| Control::Ai {
            profile: profile.to_string(),
        };
        let team = |name: &str, control: Control, balance: i64, tier: u8| TeamConfig {
            name: name.to_string(),
            control,
            starting_balance: Decimal::new(balance, 0),
            tier,
        };
        Self {
            league_id: "premier".to_string(),
            seed: 42,
            season: SeasonConfig::default(),
            scoring: ScoringConfig::default(),
            race: RaceConfig::default(),
            growth: GrowthConfig::default(),
            standings: StandingsConfig::default(),
            economy: EconomyConfig::default(),
            actions: ActionCosts::default(),
            market: MarketConfig::default(),
            history: HistoryConfig::default(),
            principals,
            teams: vec![
                team("Apex Racing", Control::Human, 12_000_000, 3),
                team("Meridian GP", ai("aggressive"), 15_000_000, 4),
                team("Vantage Motorsport", ai("balanced"), 12_000_000, 3),
                team("Northwind Racing", ai("frugal"), 9_000_000, 2),
                team("Ironclad Competition", ai("balanced"), 18_000_000, 5),
                team("Solstice Autosport", ai("aggressive"), 8_000_000, 2),
            ],
        }
    }
}

fn check_weight(field: &'static str, v: f32) -> Result<(), ValidationError> {
    if !v.is_finite() {
        return Err(ValidationError::NonFinite(field));
    }
    if v < 0.0 {
        return Err(ValidationError::OutOfRange(field));
    }
    Ok(())
}

fn check_money(field: &'static str, v: Decimal) -> Result<(), ValidationError> {
    if v < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(field));
    }
    Ok(())
}

/// Validate the whole configuration, including cross-references.
pub fn validate_config(cfg: &LeagueConfig) -> Result<(), ValidationError> {
    if cfg.league_id.trim().is_empty() {
        return Err(ValidationError::EmptyField("league_id"));
    }
    if cfg.season.tracks.is_empty() {
        return Err(ValidationError::EmptyField("season.tracks"));
    }
    if cfg.season.tracks.iter().any(|t| t.trim().is_empty()) {
        return Err(ValidationError::EmptyField("season.tracks[]"));
    }
    if cfg.season.ticks_between_races == 0 {
        return Err(ValidationError::OutOfRange("season.ticks_between_races"));
    }
    if cfg.season.days_per_tick == 0 {
        return Err(ValidationError::OutOfRange("season.days_per_tick"));
    }

    if cfg.scoring.points.is_empty() {
        return Err(ValidationError::EmptyField("scoring.points"));
    }
    for p in &cfg.scoring.prize_money {
        check_money("scoring.prize_money", *p)?;
    }
    check_money("scoring.forfeit_fine", cfg.scoring.forfeit_fine)?;

    let r = &cfg.race;
    for (field, v) in [
        ("race.pace_weight", r.pace_weight),
        ("race.consistency_weight", r.consistency_weight),
        ("race.racecraft_weight", r.racecraft_weight),
        ("race.driver_weight", r.driver_weight),
        ("race.car_weight", r.car_weight),
        ("race.crew_weight", r.crew_weight),
        ("race.perturbation", r.perturbation),
    ] {
        check_weight(field, v)?;
    }
    if r.pace_weight + r.consistency_weight + r.racecraft_weight <= 0.0 {
        return Err(ValidationError::OutOfRange("race driver weights (sum)"));
    }
    if r.driver_weight + r.car_weight + r.crew_weight <= 0.0 {
        return Err(ValidationError::OutOfRange("race entrant weights (sum)"));
    }
    if !(0.0..=1.0).contains(&r.dnf_base_chance) {
        return Err(ValidationError::OutOfRange("race.dnf_base_chance"));
    }

    let g = &cfg.growth;
    for (field, v) in [
        ("growth.base_step", g.base_step),
        ("growth.performance_weight", g.performance_weight),
        ("growth.noise", g.noise),
        ("growth.max_step", g.max_step),
        ("growth.car_development_rate", g.car_development_rate),
        ("growth.car_obsolescence", g.car_obsolescence),
    ] {
        check_weight(field, v)?;
    }
    if !g.age_ramp_years.is_finite() || g.age_ramp_years <= 0.0 {
        return Err(ValidationError::OutOfRange("growth.age_ramp_years"));
    }

    let s = &cfg.standings;
    if !(s.recency_decay > 0.0 && s.recency_decay <= 1.0) {
        return Err(ValidationError::OutOfRange("standings.recency_decay"));
    }
    if !(0.0..=1.0).contains(&s.results_share) {
        return Err(ValidationError::OutOfRange("standings.results_share"));
    }
    if s.window == 0 {
        return Err(ValidationError::OutOfRange("standings.window"));
    }
    if !s.scale.is_finite() || s.scale <= 0.0 {
        return Err(ValidationError::OutOfRange("standings.scale"));
    }
    let w = &s.role_weights;
    for (field, v) in [
        ("standings.role_weights.driver", w.driver),
        ("standings.role_weights.car", w.car),
        ("standings.role_weights.engineer", w.engineer),
        ("standings.role_weights.mechanic", w.mechanic),
        ("standings.role_weights.strategist", w.strategist),
    ] {
        check_weight(field, v)?;
    }
    if w.total() <= 0.0 {
        return Err(ValidationError::OutOfRange("standings.role_weights (sum)"));
    }

    let e = &cfg.economy;
    check_money("economy.overdraft_limit", e.overdraft_limit)?;
    check_money("economy.sponsorship_base", e.sponsorship_base)?;
    check_money("economy.operating_cost", e.operating_cost)?;
    if e.hard_floor < -e.overdraft_limit {
        return Err(ValidationError::OutOfRange("economy.hard_floor"));
    }
    if !(0.0..1.0).contains(&e.sponsorship_noise) {
        return Err(ValidationError::OutOfRange("economy.sponsorship_noise"));
    }

    let a = &cfg.actions;
    check_money("actions.upgrade_cost", a.upgrade_cost)?;
    check_money("actions.training_cost", a.training_cost)?;
    check_money("actions.severance_fraction", a.severance_fraction)?;
    check_weight("actions.upgrade_delta", a.upgrade_delta)?;
    check_weight("actions.training_delta", a.training_delta)?;

    let m = &cfg.market;
    if m.salary_per_tier.is_empty() {
        return Err(ValidationError::EmptyField("market.salary_per_tier"));
    }
    for v in &m.salary_per_tier {
        check_money("market.salary_per_tier", *v)?;
    }
    check_money("market.acceptance_ratio", m.acceptance_ratio)?;
    check_money("market.signing_fee_fraction", m.signing_fee_fraction)?;
    check_money("market.buyout_fraction", m.buyout_fraction)?;
    if m.contract_seasons == 0 {
        return Err(ValidationError::OutOfRange("market.contract_seasons"));
    }
    if m.requirements.drivers == 0 {
        return Err(ValidationError::OutOfRange("market.requirements.drivers"));
    }

    let h = &cfg.history;
    if h.pulse_window == 0 {
        return Err(ValidationError::OutOfRange("history.pulse_window"));
    }
    for (field, v) in [
        ("history.win_rate_weight", h.win_rate_weight),
        ("history.momentum_weight", h.momentum_weight),
        ("history.streak_weight", h.streak_weight),
    ] {
        check_weight(field, v)?;
    }
    if h.win_rate_weight + h.momentum_weight + h.streak_weight <= 0.0 {
        return Err(ValidationError::OutOfRange("history weights (sum)"));
    }
    if h.streak_cap == 0
        || h.win_milestone_step == 0
        || h.podium_milestone_step == 0
        || h.race_milestone_step == 0
    {
        return Err(ValidationError::OutOfRange("history milestone steps"));
    }

    for t in cfg.principals.values() {
        validate_tendencies(t)?;
    }

    if cfg.teams.is_empty() {
        return Err(ValidationError::EmptyField("teams"));
    }
    let mut names = BTreeSet::new();
    for t in &cfg.teams {
        if t.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("teams[].name"));
        }
        if !names.insert(t.name.as_str()) {
            return Err(ValidationError::DuplicateTeam(t.name.clone()));
        }
        if !(1..=5).contains(&t.tier) {
            return Err(ValidationError::OutOfRange("teams[].tier"));
        }
        if let Control::Ai { profile } = &t.control {
            if !cfg.principals.contains_key(profile) {
                return Err(ValidationError::UnknownProfile(profile.clone()));
            }
        }
    }
    Ok(())
}
