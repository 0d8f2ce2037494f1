//! In-memory copy of the primary persisted tables.
//!
//! Rows are appended by the engine's systems only. A flush cursor per table
//! lets the persistence layer read the rows written since its last
//! acknowledged flush, between ticks.

use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use sim_core::records::{
    ChampionshipStandingRow, FinancialTransactionRow, RaceResultRow, RecordBatch,
    SeasonSummaryRow, TeamOutcomeRow,
};
use sim_core::TeamName;

use crate::history::HistoricalTracker;
use crate::state::TeamState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Flushed {
    season_summary: usize,
    race_results: usize,
    financial_transactions: usize,
    team_outcomes: usize,
    championship_standings: usize,
}

/// Primary table rows, oldest first.
#[derive(Resource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBook {
    season_summary: Vec<SeasonSummaryRow>,
    race_results: Vec<RaceResultRow>,
    financial_transactions: Vec<FinancialTransactionRow>,
    team_outcomes: Vec<TeamOutcomeRow>,
    championship_standings: Vec<ChampionshipStandingRow>,
    /// Ledger entries already mirrored, per team.
    ledger_cursors: BTreeMap<TeamName, usize>,
    flushed: Flushed,
}

impl RecordBook {
    pub(crate) fn push_race(&mut self, rows: Vec<RaceResultRow>) {
        self.race_results.extend(rows);
    }

    pub(crate) fn push_outcome(&mut self, row: TeamOutcomeRow) {
        self.team_outcomes.push(row);
    }

    pub(crate) fn push_championship(&mut self, rows: Vec<ChampionshipStandingRow>) {
        self.championship_standings.extend(rows);
    }

    pub(crate) fn push_season(&mut self, rows: Vec<SeasonSummaryRow>) {
        self.season_summary.extend(rows);
    }

    /// Mirror new ledger entries into `financial_transactions`.
    pub(crate) fn sync_ledgers<'a>(&mut self, teams: impl Iterator<Item = &'a TeamState>) {
        for state in teams {
            let cursor = self.ledger_cursors.entry(state.name().clone()).or_insert(0);
            let entries = state.ledger.entries();
            for t in entries.iter().skip(*cursor) {
                self.financial_transactions.push(FinancialTransactionRow {
                    tick: t.tick,
                    season: t.season,
                    team_name: state.name().0.clone(),
                    transaction_type: t.kind.as_str().to_string(),
                    amount: t.amount,
                    balance_after: t.balance_after,
                    description: t.description.clone(),
                });
            }
            *cursor = entries.len();
        }
    }

    pub fn season_summary(&self) -> &[SeasonSummaryRow] {
        &self.season_summary
    }

    pub fn race_results(&self) -> &[RaceResultRow] {
        &self.race_results
    }

    pub fn financial_transactions(&self) -> &[FinancialTransactionRow] {
        &self.financial_transactions
    }

    pub fn team_outcomes(&self) -> &[TeamOutcomeRow] {
        &self.team_outcomes
    }

    pub fn championship_standings(&self) -> &[ChampionshipStandingRow] {
        &self.championship_standings
    }

    /// Rows not yet handed to a flush.
    pub fn pending_rows(&self) -> usize {
        self.season_summary.len() - self.flushed.season_summary
            + self.race_results.len() - self.flushed.race_results
            + self.financial_transactions.len() - self.flushed.financial_transactions
            + self.team_outcomes.len() - self.flushed.team_outcomes
            + self.championship_standings.len() - self.flushed.championship_standings
    }

    /// Unacknowledged primary rows plus full images of the derived tables.
    /// Reading a batch moves nothing; see [`RecordBook::ack_batch`].
    pub fn pending_batch(&self, tracker: &HistoricalTracker) -> RecordBatch {
        let f = self.flushed;
        RecordBatch {
            season_summary: self.season_summary[f.season_summary..].to_vec(),
            race_results: self.race_results[f.race_results..].to_vec(),
            financial_transactions: self.financial_transactions[f.financial_transactions..].to_vec(),
            team_outcomes: self.team_outcomes[f.team_outcomes..].to_vec(),
            championship_standings: self.championship_standings[f.championship_standings..].to_vec(),
            career_stats: tracker.career_stats().cloned().collect(),
            team_career_totals: tracker.team_totals().cloned().collect(),
            active_streaks: tracker.streaks().cloned().collect(),
            team_pulse_metrics: tracker.pulses().cloned().collect(),
        }
    }

    /// Mark a batch from [`RecordBook::pending_batch`] as durably written.
    /// Only the rows it carried are acknowledged, so rows appended after the
    /// batch was read stay pending.
    pub fn ack_batch(&mut self, batch: &RecordBatch) {
        let f = &mut self.flushed;
        f.season_summary = (f.season_summary + batch.season_summary.len()).min(self.season_summary.len());
        f.race_results = (f.race_results + batch.race_results.len()).min(self.race_results.len());
        f.financial_transactions = (f.financial_transactions + batch.financial_transactions.len())
            .min(self.financial_transactions.len());
        f.team_outcomes = (f.team_outcomes + batch.team_outcomes.len()).min(self.team_outcomes.len());
        f.championship_standings = (f.championship_standings + batch.championship_standings.len())
            .min(self.championship_standings.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sim_core::{Control, Team};
    use sim_econ::{Ledger, OverdraftPolicy, TransactionKind};

    #[test]
    fn ledger_sync_and_batches_only_carry_new_rows() {
        let team = Team::new(TeamName::from("Apex Racing"), Control::Human);
        let ledger =
            Ledger::with_opening_balance(OverdraftPolicy::default(), 0, Decimal::new(1_000, 0)).unwrap();
        let mut state = TeamState::new(team, ledger, 3);
        let mut book = RecordBook::default();
        book.sync_ledgers(std::iter::once(&state));
        state
            .ledger
            .credit(1, 1, TransactionKind::PrizeMoney, Decimal::new(50, 0), "P1")
            .unwrap();
        book.sync_ledgers(std::iter::once(&state));
        book.sync_ledgers(std::iter::once(&state));
        assert_eq!(book.financial_transactions().len(), 2);
        assert_eq!(book.financial_transactions()[1].balance_after, Decimal::new(1_050, 0));
        assert_eq!(book.financial_transactions()[1].transaction_type, "prize_money");

        let tracker = HistoricalTracker::default();
        assert_eq!(book.pending_rows(), 2);
        let first = book.pending_batch(&tracker);
        assert_eq!(first.financial_transactions.len(), 2);
        book.ack_batch(&first);
        assert_eq!(book.pending_rows(), 0);
        assert!(book.pending_batch(&tracker).is_empty());
    }

    #[test]
    fn unacknowledged_rows_are_offered_again() {
        let team = Team::new(TeamName::from("Apex Racing"), Control::Human);
        let ledger =
            Ledger::with_opening_balance(OverdraftPolicy::default(), 0, Decimal::new(1_000, 0)).unwrap();
        let mut state = TeamState::new(team, ledger, 3);
        let mut book = RecordBook::default();
        let tracker = HistoricalTracker::default();
        book.sync_ledgers(std::iter::once(&state));

        let lost = book.pending_batch(&tracker);
        assert_eq!(lost.appended_rows(), 1);
        // The write failed, so nothing is acknowledged.
        assert_eq!(book.pending_batch(&tracker), lost);

        state
            .ledger
            .credit(1, 1, TransactionKind::Sponsorship, Decimal::new(10, 0), "S")
            .unwrap();
        book.sync_ledgers(std::iter::once(&state));
        let retry = book.pending_batch(&tracker);
        assert_eq!(retry.financial_transactions.len(), 2);

        // Acknowledging the older batch keeps the newer row pending.
        book.ack_batch(&lost);
        assert_eq!(book.pending_rows(), 1);
        assert_eq!(book.pending_batch(&tracker).financial_transactions[0].description, "S");
    }
}
