//! Read-only query surface over the record book and the history tracker.
//!
//! Primary tables come back newest first; derived tables in key order.
//! Every query takes a [`RecordFilter`] whose optional `limit` caps the
//! number of rows returned.

use std::collections::BTreeMap;

use sim_core::records::{
    ActiveStreaks, CareerStatsRow, ChampionshipStandingRow, FinancialTransactionRow,
    RaceResultRow, RecordFilter, SeasonSummaryRow, Table, TeamCareerTotals, TeamOutcomeRow,
    TeamPulse,
};
use sim_core::{SimError, TeamName};
use sim_econ::Transaction;

use crate::history::{ContextPacket, HistoricalTracker};
use crate::records::RecordBook;
use crate::standings::ChampionshipEntry;
use crate::state::{Clock, League};

fn newest_first<T: Clone>(
    rows: &[T],
    filter: &RecordFilter,
    keep: impl Fn(&T) -> bool,
) -> Vec<T> {
    rows.iter()
        .rev()
        .filter(|r| keep(r))
        .take(filter.max_rows())
        .cloned()
        .collect()
}

/// Borrowed, read-only view of the engine's records.
#[derive(Clone, Copy)]
pub struct QuerySurface<'w> {
    league: &'w League,
    records: &'w RecordBook,
    tracker: &'w HistoricalTracker,
    clock: Clock,
}

impl<'w> QuerySurface<'w> {
    pub fn new(
        league: &'w League,
        records: &'w RecordBook,
        tracker: &'w HistoricalTracker,
        clock: Clock,
    ) -> Self {
        Self {
            league,
            records,
            tracker,
            clock,
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn season_summary(&self, f: &RecordFilter) -> Result<Vec<SeasonSummaryRow>, SimError> {
        f.validate_for(Table::SeasonSummary)?;
        Ok(newest_first(self.records.season_summary(), f, |r| {
            f.team_matches(&r.team_name) && f.season_matches(r.season)
        }))
    }

    /// `entity` matches the driver name.
    pub fn race_results(&self, f: &RecordFilter) -> Result<Vec<RaceResultRow>, SimError> {
        f.validate_for(Table::RaceResults)?;
        Ok(newest_first(self.records.race_results(), f, |r| {
            f.team_matches(&r.team_name)
                && f.season_matches(r.season)
                && f.entity_matches(&r.driver_name)
        }))
    }

    pub fn financial_transactions(
        &self,
        f: &RecordFilter,
    ) -> Result<Vec<FinancialTransactionRow>, SimError> {
        f.validate_for(Table::FinancialTransactions)?;
        Ok(newest_first(self.records.financial_transactions(), f, |r| {
            f.team_matches(&r.team_name) && f.season_matches(r.season)
        }))
    }

    pub fn team_outcomes(&self, f: &RecordFilter) -> Result<Vec<TeamOutcomeRow>, SimError> {
        f.validate_for(Table::TeamOutcomes)?;
        Ok(newest_first(self.records.team_outcomes(), f, |r| {
            f.team_matches(&r.team_name) && f.season_matches(r.season)
        }))
    }

    pub fn championship_standings(
        &self,
        f: &RecordFilter,
    ) -> Result<Vec<ChampionshipStandingRow>, SimError> {
        f.validate_for(Table::ChampionshipStandings)?;
        Ok(newest_first(self.records.championship_standings(), f, |r| {
            f.team_matches(&r.team_name) && f.season_matches(r.season)
        }))
    }

    /// Career lines, most points first.
    pub fn career_stats(&self, f: &RecordFilter) -> Result<Vec<CareerStatsRow>, SimError> {
        f.validate_for(Table::CareerStats)?;
        let mut rows: Vec<CareerStatsRow> = self
            .tracker
            .career_stats()
            .filter(|r| f.entity_matches(&r.entity_name) && f.role_matches(r.role))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.points_total
                .cmp(&a.points_total)
                .then_with(|| a.entity_name.cmp(&b.entity_name))
        });
        rows.truncate(f.max_rows());
        Ok(rows)
    }

    pub fn team_career_totals(&self, f: &RecordFilter) -> Result<Vec<TeamCareerTotals>, SimError> {
        f.validate_for(Table::TeamCareerTotals)?;
        Ok(self
            .tracker
            .team_totals()
            .filter(|r| f.team_matches(&r.team_name))
            .take(f.max_rows())
            .cloned()
            .collect())
    }

    pub fn active_streaks(&self, f: &RecordFilter) -> Result<Vec<ActiveStreaks>, SimError> {
        f.validate_for(Table::ActiveStreaks)?;
        Ok(self
            .tracker
            .streaks()
            .filter(|r| f.team_matches(&r.team_name))
            .take(f.max_rows())
            .cloned()
            .collect())
    }

    pub fn team_pulse_metrics(&self, f: &RecordFilter) -> Result<Vec<TeamPulse>, SimError> {
        f.validate_for(Table::TeamPulseMetrics)?;
        Ok(self
            .tracker
            .pulses()
            .filter(|r| f.team_matches(&r.team_name))
            .take(f.max_rows())
            .cloned()
            .collect())
    }

    /// Row count of every logical table.
    pub fn census(&self) -> BTreeMap<Table, usize> {
        Table::ALL
            .into_iter()
            .map(|t| {
                let n = match t {
                    Table::SeasonSummary => self.records.season_summary().len(),
                    Table::RaceResults => self.records.race_results().len(),
                    Table::FinancialTransactions => self.records.financial_transactions().len(),
                    Table::CareerStats => self.tracker.career_stats().count(),
                    Table::TeamOutcomes => self.records.team_outcomes().len(),
                    Table::ChampionshipStandings => self.records.championship_standings().len(),
                    Table::TeamCareerTotals => self.tracker.team_totals().count(),
                    Table::ActiveStreaks => self.tracker.streaks().count(),
                    Table::TeamPulseMetrics => self.tracker.pulses().count(),
                };
                (t, n)
            })
            .collect()
    }

    /// Pulse, streaks, career totals and recent milestones of a league team.
    pub fn context_packet(&self, team: &TeamName) -> Result<ContextPacket, SimError> {
        self.league.team(team)?;
        Ok(self.tracker.context_packet(team))
    }

    /// Live championship table of the current season.
    pub fn standings(&self) -> Vec<ChampionshipEntry> {
        self.league.championship_table()
    }

    /// Ledger entries of a team, newest first.
    pub fn ledger_history(&self, team: &TeamName, limit: Option<usize>) -> Result<Vec<Transaction>, SimError> {
        if limit == Some(0) {
            return Err(SimError::InvalidInput("limit must be positive".into()));
        }
        Ok(self.league.team(team)?.ledger.history(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulationEngine;
    use sim_core::LeagueConfig;

    fn played(ticks: u64) -> SimulationEngine {
        let mut engine = SimulationEngine::new(LeagueConfig::default()).unwrap();
        engine.run_ticks(ticks);
        engine
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let engine = played(0);
        let q = engine.queries();
        for bad in [
            RecordFilter::default().limit(0),
            RecordFilter::default().in_season(0),
            RecordFilter::default().for_team("  "),
            RecordFilter::default().for_entity(""),
        ] {
            assert!(matches!(q.race_results(&bad), Err(SimError::InvalidInput(_))));
        }
        assert!(matches!(
            q.context_packet(&TeamName::from("Nobody")),
            Err(SimError::UnknownTeam(_))
        ));
    }

    #[test]
    fn season_filter_on_seasonless_tables_is_rejected() {
        let engine = played(0);
        let q = engine.queries();
        let f = RecordFilter::default().in_season(1);
        assert!(matches!(q.team_career_totals(&f), Err(SimError::InvalidInput(_))));
        assert!(matches!(q.active_streaks(&f), Err(SimError::InvalidInput(_))));
        assert!(matches!(q.team_pulse_metrics(&f), Err(SimError::InvalidInput(_))));
        assert!(matches!(q.career_stats(&f), Err(SimError::InvalidInput(_))));
        assert!(q.season_summary(&f).is_ok());
    }

    #[test]
    fn race_results_are_newest_first_and_limited() {
        let engine = played(8);
        let q = engine.queries();
        let all = q.race_results(&RecordFilter::default()).unwrap();
        assert!(all.windows(2).all(|w| w[0].tick >= w[1].tick));
        let apex = q
            .race_results(&RecordFilter::default().for_team("Apex Racing").limit(2))
            .unwrap();
        assert_eq!(apex.len(), 2);
        assert!(apex.iter().all(|r| r.team_name == "Apex Racing"));
        assert_eq!(apex[0].race_number, 4);
        let driver = apex[0].driver_name.clone();
        let by_driver = q
            .race_results(&RecordFilter::default().for_entity(driver.clone()))
            .unwrap();
        assert!(!by_driver.is_empty());
        assert!(by_driver.iter().all(|r| r.driver_name == driver));
    }

    #[test]
    fn census_counts_every_table() {
        let engine = played(4);
        let census = engine.queries().census();
        assert_eq!(census.len(), Table::ALL.len());
        let teams = engine.league().teams.len();
        assert_eq!(census[&Table::RaceResults], 2 * teams);
        assert_eq!(census[&Table::ChampionshipStandings], 2 * teams);
        assert_eq!(census[&Table::SeasonSummary], 0);
        assert_eq!(census[&Table::ActiveStreaks], teams);
        assert!(census[&Table::FinancialTransactions] > 0);
    }

    #[test]
    fn ledger_history_matches_the_ledger() {
        let engine = played(3);
        let apex = TeamName::from("Apex Racing");
        let q = engine.queries();
        let last = q.ledger_history(&apex, Some(1)).unwrap();
        assert_eq!(
            last[0].balance_after,
            engine.league().team(&apex).unwrap().ledger.balance()
        );
        let packet = q.context_packet(&apex).unwrap();
        assert_eq!(packet.team, apex);
        assert_eq!(q.standings().len(), engine.league().teams.len());
    }
}
