#![deny(warnings)]

//! Economic models for the league: per-team ledgers and costed actions.
//!
//! This crate provides validated utilities for:
//! - An append-only transaction log per team whose balance is always its fold
//! - Overdraft policy separating committed costs from discretionary spend
//! - Sponsorship income with seeded noise, asking salaries and proration
//! - The action catalogue shared by human and AI teams, executed all-or-nothing

mod actions;
mod income;
mod ledger;

use rust_decimal::Decimal;
use sim_core::SimError;
use thiserror::Error;

pub use actions::{
    check_eligible, discretionary_actions, execute, Action, ActionContext, ActionKind,
    ActionReceipt, UPGRADE_TARGETS,
};
pub use income::{asking_salary, fraction_of, per_tick, rating_tier, share, sponsorship_income};
pub use ledger::{Ledger, OverdraftPolicy, Transaction, TransactionKind};

/// Errors produced by economic operations. None of them leave partial state.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Debit would cross the floor for its transaction kind.
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    /// Monetary amounts must be positive where a movement is recorded.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),
    /// Action not permitted in the current team or entity state.
    #[error("ineligible: {0}")]
    Ineligible(String),
    /// A `balance_after` disagrees with the running sum at this sequence number.
    #[error("ledger corrupt at entry {0}")]
    LedgerCorrupt(u64),
    /// Numeric conversion to or from floating point failed.
    #[error("non-finite numeric conversion")]
    NonFinite,
    #[error(transparent)]
    Core(#[from] SimError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_amounts() {
        let e = EconError::InsufficientFunds {
            needed: Decimal::new(300_000, 0),
            available: Decimal::new(120_000, 0),
        };
        assert_eq!(
            e.to_string(),
            "insufficient funds: needed 300000, available 120000"
        );
        let core: EconError = SimError::UnknownTeam("Nope".into()).into();
        assert_eq!(core.to_string(), "unknown team Nope");
    }
}
