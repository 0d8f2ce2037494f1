//! Rows of the persisted logical schema.
//!
//! Primary tables are written by the engine; `team_career_totals`,
//! `active_streaks` and `team_pulse_metrics` only by the history tracker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ratings::Role;
use crate::SimError;

/// Logical tables, used by census queries and the persisted store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    SeasonSummary,
    RaceResults,
    FinancialTransactions,
    CareerStats,
    TeamOutcomes,
    ChampionshipStandings,
    TeamCareerTotals,
    ActiveStreaks,
    TeamPulseMetrics,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::SeasonSummary,
        Table::RaceResults,
        Table::FinancialTransactions,
        Table::CareerStats,
        Table::TeamOutcomes,
        Table::ChampionshipStandings,
        Table::TeamCareerTotals,
        Table::ActiveStreaks,
        Table::TeamPulseMetrics,
    ];

    /// SQL table name.
    pub fn as_str(self) -> &'static str {
        match self {
            Table::SeasonSummary => "season_summary",
            Table::RaceResults => "race_results",
            Table::FinancialTransactions => "financial_transactions",
            Table::CareerStats => "career_stats",
            Table::TeamOutcomes => "team_outcomes",
            Table::ChampionshipStandings => "championship_standings",
            Table::TeamCareerTotals => "team_career_totals",
            Table::ActiveStreaks => "active_streaks",
            Table::TeamPulseMetrics => "team_pulse_metrics",
        }
    }

    /// Whether the table is derived (written only by the history tracker).
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Table::CareerStats
                | Table::TeamCareerTotals
                | Table::ActiveStreaks
                | Table::TeamPulseMetrics
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonSummaryRow {
    pub season: u32,
    pub tick: u64,
    pub league_id: String,
    pub team_name: String,
    pub final_position: u32,
    pub points: u32,
    pub prize_money: Decimal,
}

/// How an entrant's race ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishStatus {
    Finished,
    /// Did not finish; classified behind every finisher.
    Dnf,
}

impl FinishStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishStatus::Finished => "finished",
            FinishStatus::Dnf => "dnf",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceResultRow {
    pub season: u32,
    pub race_number: u32,
    pub tick: u64,
    pub track_name: String,
    pub team_name: String,
    pub driver_name: String,
    pub grid_position: u32,
    pub finish_position: u32,
    pub points_earned: u32,
    pub status: FinishStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialTransactionRow {
    pub tick: u64,
    pub season: u32,
    pub team_name: String,
    pub transaction_type: String,
    /// Signed: credits positive, debits negative.
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareerStatsRow {
    pub entity_name: String,
    pub role: Role,
    pub races_participated: u32,
    pub wins: u32,
    pub podiums: u32,
    pub points_total: u32,
    pub championships: u32,
}

/// AI decision audit trail entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamOutcomeRow {
    pub tick: u64,
    pub season: u32,
    pub team_name: String,
    pub decision_type: String,
    /// JSON document describing the decision and its scores.
    pub outcome_data: String,
    pub result_score: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionshipStandingRow {
    pub tick: u64,
    pub season: u32,
    pub league_id: String,
    pub team_name: String,
    pub position: u32,
    pub points: u32,
    pub races_completed: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCareerTotals {
    pub team_name: String,
    pub seasons: u32,
    pub races: u32,
    pub wins: u32,
    pub podiums: u32,
    pub points: u32,
    pub championships: u32,
    /// Best final championship position.
    pub best_finish: Option<u32>,
    /// Most points in a single season, and that season.
    pub peak_season_points: u32,
    pub peak_season: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStreaks {
    pub team_name: String,
    pub current_podiums: u32,
    pub current_points: u32,
    pub current_dnfs: u32,
    pub best_podiums: u32,
    pub best_points: u32,
    pub longest_dnfs: u32,
}

/// Direction of recent form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Momentum {
    Rising,
    #[default]
    Steady,
    Falling,
}

impl Momentum {
    pub fn as_str(self) -> &'static str {
        match self {
            Momentum::Rising => "rising",
            Momentum::Steady => "steady",
            Momentum::Falling => "falling",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPulse {
    pub team_name: String,
    pub tick: u64,
    /// Composite in [0, 100].
    pub pulse: f32,
    pub win_rate: f32,
    pub momentum: Momentum,
    /// Recent minus earlier form, in [-1, 1].
    pub momentum_value: f32,
    pub streak_magnitude: f32,
}

/// Rows produced since the previous flush, plus full images of derived tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub season_summary: Vec<SeasonSummaryRow>,
    pub race_results: Vec<RaceResultRow>,
    pub financial_transactions: Vec<FinancialTransactionRow>,
    pub team_outcomes: Vec<TeamOutcomeRow>,
    pub championship_standings: Vec<ChampionshipStandingRow>,
    pub career_stats: Vec<CareerStatsRow>,
    pub team_career_totals: Vec<TeamCareerTotals>,
    pub active_streaks: Vec<ActiveStreaks>,
    pub team_pulse_metrics: Vec<TeamPulse>,
}

impl RecordBatch {
    /// Count of append-only rows carried by the batch.
    pub fn appended_rows(&self) -> usize {
        self.season_summary.len()
            + self.race_results.len()
            + self.financial_transactions.len()
            + self.team_outcomes.len()
            + self.championship_standings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appended_rows() == 0
            && self.career_stats.is_empty()
            && self.team_career_totals.is_empty()
            && self.active_streaks.is_empty()
            && self.team_pulse_metrics.is_empty()
    }
}

/// Parameters shared by all record queries. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub team: Option<String>,
    pub season: Option<u32>,
    /// Entity display name, matched exactly.
    pub entity: Option<String>,
    pub role: Option<Role>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn for_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn in_season(mut self, season: u32) -> Self {
        self.season = Some(season);
        self
    }

    pub fn for_entity(mut self, name: impl Into<String>) -> Self {
        self.entity = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject malformed filters before any rows are read.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.team.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(SimError::InvalidInput("team filter must not be empty".into()));
        }
        if self.entity.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(SimError::InvalidInput("entity filter must not be empty".into()));
        }
        if self.season == Some(0) {
            return Err(SimError::InvalidInput("seasons start at 1".into()));
        }
        if self.limit == Some(0) {
            return Err(SimError::InvalidInput("limit must be positive".into()));
        }
        Ok(())
    }

    /// [`RecordFilter::validate`], then reject fields `table` cannot be
    /// filtered on instead of silently ignoring them.
    pub fn validate_for(&self, table: Table) -> Result<(), SimError> {
        self.validate()?;
        let unsupported = |field: &str| {
            SimError::InvalidInput(format!("{} cannot be filtered by {field}", table.as_str()))
        };
        if self.season.is_some() && table.is_derived() {
            return Err(unsupported("season"));
        }
        if self.team.is_some() && table == Table::CareerStats {
            return Err(unsupported("team"));
        }
        if self.entity.is_some() && !matches!(table, Table::RaceResults | Table::CareerStats) {
            return Err(unsupported("entity"));
        }
        if self.role.is_some() && table != Table::CareerStats {
            return Err(unsupported("role"));
        }
        Ok(())
    }

    pub fn team_matches(&self, team: &str) -> bool {
        self.team.as_deref().map_or(true, |t| t == team)
    }

    pub fn season_matches(&self, season: u32) -> bool {
        self.season.map_or(true, |s| s == season)
    }

    pub fn entity_matches(&self, name: &str) -> bool {
        self.entity.as_deref().map_or(true, |e| e == name)
    }

    pub fn role_matches(&self, role: Role) -> bool {
        self.role.map_or(true, |r| r == role)
    }

    /// Row cap; unbounded when no limit is set.
    pub fn max_rows(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod filter_tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let f = RecordFilter::default();
        assert!(f.validate().is_ok());
        assert!(f.team_matches("anyone"));
        assert!(f.season_matches(9));
        assert!(f.role_matches(Role::Car));
        assert_eq!(f.max_rows(), usize::MAX);
    }

    #[test]
    fn set_fields_narrow_the_match() {
        let f = RecordFilter::default()
            .for_team("Apex Racing")
            .in_season(2)
            .with_role(Role::Driver)
            .limit(3);
        assert!(f.team_matches("Apex Racing"));
        assert!(!f.team_matches("Meridian GP"));
        assert!(!f.season_matches(1));
        assert!(!f.role_matches(Role::Engineer));
        assert_eq!(f.max_rows(), 3);
    }

    #[test]
    fn filters_on_missing_columns_are_rejected() {
        let season = RecordFilter::default().in_season(1);
        for table in [
            Table::CareerStats,
            Table::TeamCareerTotals,
            Table::ActiveStreaks,
            Table::TeamPulseMetrics,
        ] {
            assert!(matches!(
                season.validate_for(table),
                Err(SimError::InvalidInput(msg)) if msg.contains("season")
            ));
        }
        assert!(season.validate_for(Table::RaceResults).is_ok());

        let driver = RecordFilter::default().for_entity("Ada Vance");
        assert!(driver.validate_for(Table::RaceResults).is_ok());
        assert!(driver.validate_for(Table::CareerStats).is_ok());
        assert!(driver.validate_for(Table::SeasonSummary).is_err());
        let role = RecordFilter::default().with_role(Role::Driver);
        assert!(role.validate_for(Table::CareerStats).is_ok());
        assert!(role.validate_for(Table::ActiveStreaks).is_err());
        let team = RecordFilter::default().for_team("Apex Racing");
        assert!(team.validate_for(Table::CareerStats).is_err());
        assert!(team.validate_for(Table::TeamPulseMetrics).is_ok());
    }
}
