//! Per-team money ledger.
//!
//! The transaction log is the source of truth; `balance` is a cached fold of
//! it and every entry records the running balance after it was applied.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::config::EconomyConfig;
use tracing::debug;

use crate::EconError;

/// What a transaction was for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    OpeningBalance,
    PrizeMoney,
    Sponsorship,
    /// Buyout received for a departing entity.
    TransferIncome,
    Payroll,
    Operating,
    ForfeitFine,
    Upgrade,
    Training,
    /// Signing fee plus any buyout paid for an incoming entity.
    Signing,
    Severance,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::OpeningBalance => "opening_balance",
            TransactionKind::PrizeMoney => "prize_money",
            TransactionKind::Sponsorship => "sponsorship",
            TransactionKind::TransferIncome => "transfer_income",
            TransactionKind::Payroll => "payroll",
            TransactionKind::Operating => "operating",
            TransactionKind::ForfeitFine => "forfeit_fine",
            TransactionKind::Upgrade => "upgrade",
            TransactionKind::Training => "training",
            TransactionKind::Signing => "signing",
            TransactionKind::Severance => "severance",
        }
    }

    /// Committed costs may run into overdraft; discretionary spend may not.
    pub fn allows_overdraft(self) -> bool {
        matches!(
            self,
            TransactionKind::Payroll | TransactionKind::Operating | TransactionKind::ForfeitFine
        )
    }
}

/// One ledger entry. `amount` is signed: credits positive, debits negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub seq: u64,
    pub tick: u64,
    pub season: u32,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
}

/// Floors applied to debits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdraftPolicy {
    /// Lowest balance reachable by discretionary spending.
    pub hard_floor: Decimal,
    /// How far below zero committed costs may push the balance.
    pub overdraft_limit: Decimal,
}

impl Default for OverdraftPolicy {
    fn default() -> Self {
        Self {
            hard_floor: Decimal::ZERO,
            overdraft_limit: Decimal::ZERO,
        }
    }
}

impl OverdraftPolicy {
    pub fn from_config(cfg: &EconomyConfig) -> Self {
        Self {
            hard_floor: cfg.hard_floor,
            overdraft_limit: cfg.overdraft_limit,
        }
    }

    /// Lowest balance a debit of `kind` may leave behind.
    pub fn floor_for(&self, kind: TransactionKind) -> Decimal {
        if kind.allows_overdraft() {
            self.hard_floor.min(-self.overdraft_limit)
        } else {
            self.hard_floor
        }
    }
}

/// Money ledger for one team.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<Transaction>,
    balance: Decimal,
    policy: OverdraftPolicy,
}

impl Ledger {
    pub fn new(policy: OverdraftPolicy) -> Self {
        Self {
            entries: Vec::new(),
            balance: Decimal::ZERO,
            policy,
        }
    }

    /// Ledger whose first entry is the opening balance, so the fold holds from the start.
    /// A team may open with nothing but never in debt.
    pub fn with_opening_balance(
        policy: OverdraftPolicy,
        tick: u64,
        amount: Decimal,
    ) -> Result<Self, EconError> {
        if amount < Decimal::ZERO {
            return Err(EconError::InvalidAmount(amount));
        }
        let mut ledger = Self::new(policy);
        ledger.push(tick, 0, TransactionKind::OpeningBalance, amount, "opening balance".into());
        Ok(ledger)
    }

    /// Cached fold of the log.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn policy(&self) -> OverdraftPolicy {
        self.policy
    }

    /// Add money. Amount must be strictly positive.
    pub fn credit(
        &mut self,
        tick: u64,
        season: u32,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<&Transaction, EconError> {
        if amount <= Decimal::ZERO {
            return Err(EconError::InvalidAmount(amount));
        }
        Ok(self.push(tick, season, kind, amount, description.into()))
    }

    /// Remove money, rejecting the debit if it would breach the floor for `kind`.
    pub fn debit(
        &mut self,
        tick: u64,
        season: u32,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<&Transaction, EconError> {
        if amount <= Decimal::ZERO {
            return Err(EconError::InvalidAmount(amount));
        }
        if !self.can_debit(kind, amount) {
            return Err(EconError::InsufficientFunds {
                needed: amount,
                available: self.headroom(kind),
            });
        }
        Ok(self.push(tick, season, kind, -amount, description.into()))
    }

    /// Whether a debit of `amount` would stay at or above the floor for `kind`.
    pub fn can_debit(&self, kind: TransactionKind, amount: Decimal) -> bool {
        amount <= Decimal::ZERO || self.balance - amount >= self.policy.floor_for(kind)
    }

    /// Largest debit of `kind` that would be accepted right now.
    pub fn headroom(&self, kind: TransactionKind) -> Decimal {
        (self.balance - self.policy.floor_for(kind)).max(Decimal::ZERO)
    }

    fn push(
        &mut self,
        tick: u64,
        season: u32,
        kind: TransactionKind,
        signed_amount: Decimal,
        description: String,
    ) -> &Transaction {
        self.balance += signed_amount;
        let seq = self.entries.len() as u64;
        debug!(tick, kind = kind.as_str(), amount = %signed_amount, balance = %self.balance, "ledger entry");
        self.entries.push(Transaction {
            seq,
            tick,
            season,
            kind,
            amount: signed_amount,
            balance_after: self.balance,
            description,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Most recent first, at most `limit` entries. Each call starts a fresh pass.
    pub fn history(&self, limit: Option<usize>) -> impl Iterator<Item = &Transaction> + '_ {
        self.entries
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
    }

    /// Entries in chronological order.
    pub fn entries(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every `balance_after` and the cached balance equal the running sum.
    pub fn verify(&self) -> Result<(), EconError> {
        let mut running = Decimal::ZERO;
        for t in &self.entries {
            running += t.amount;
            if running != t.balance_after {
                return Err(EconError::LedgerCorrupt(t.seq));
            }
        }
        if running != self.balance {
            return Err(EconError::LedgerCorrupt(self.entries.len() as u64));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn policy() -> OverdraftPolicy {
        OverdraftPolicy {
            hard_floor: Decimal::ZERO,
            overdraft_limit: d(100_000),
        }
    }

    #[test]
    fn discretionary_debit_respects_hard_floor() {
        let mut l = Ledger::with_opening_balance(policy(), 0, d(50_000)).unwrap();
        let err = l
            .debit(1, 1, TransactionKind::Upgrade, d(60_000), "new floor")
            .unwrap_err();
        assert_eq!(
            err,
            EconError::InsufficientFunds {
                needed: d(60_000),
                available: d(50_000)
            }
        );
        assert_eq!(l.len(), 1);
        assert_eq!(l.balance(), d(50_000));
    }

    #[test]
    fn committed_costs_may_overdraw_to_limit() {
        let mut l = Ledger::with_opening_balance(policy(), 0, d(50_000)).unwrap();
        l.debit(1, 1, TransactionKind::Payroll, d(120_000), "payroll")
            .unwrap();
        assert_eq!(l.balance(), d(-70_000));
        assert!(l
            .debit(2, 1, TransactionKind::Payroll, d(40_000), "payroll")
            .is_err());
        l.verify().unwrap();
    }

    #[test]
    fn history_is_reverse_chronological_and_restartable() {
        let mut l = Ledger::with_opening_balance(policy(), 0, d(10)).unwrap();
        l.credit(1, 1, TransactionKind::Sponsorship, d(5), "a").unwrap();
        l.credit(2, 1, TransactionKind::PrizeMoney, d(7), "b").unwrap();
        let first: Vec<u64> = l.history(Some(2)).map(|t| t.tick).collect();
        let again: Vec<u64> = l.history(Some(2)).map(|t| t.tick).collect();
        assert_eq!(first, vec![2, 1]);
        assert_eq!(first, again);
        assert_eq!(l.history(None).count(), 3);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut l = Ledger::new(policy());
        assert!(l.credit(0, 0, TransactionKind::Sponsorship, Decimal::ZERO, "x").is_err());
        assert!(l.debit(0, 0, TransactionKind::Payroll, d(-5), "x").is_err());
        assert!(l.is_empty());
    }

    #[test]
    fn opening_balance_may_be_zero_but_not_negative() {
        let err = Ledger::with_opening_balance(policy(), 0, d(-1)).unwrap_err();
        assert_eq!(err, EconError::InvalidAmount(d(-1)));
        let l = Ledger::with_opening_balance(policy(), 0, Decimal::ZERO).unwrap();
        assert_eq!(l.len(), 1);
        assert_eq!(l.balance(), Decimal::ZERO);
        l.verify().unwrap();
    }

    proptest! {
        #[test]
        fn balance_is_always_the_fold(ops in proptest::collection::vec((any::<bool>(), 1i64..200_000, 0usize..4), 1..120)) {
            let kinds = [
                TransactionKind::Payroll,
                TransactionKind::Upgrade,
                TransactionKind::Sponsorship,
                TransactionKind::PrizeMoney,
            ];
            let mut l = Ledger::with_opening_balance(policy(), 0, d(250_000)).unwrap();
            for (i, (is_credit, amt, k)) in ops.into_iter().enumerate() {
                let kind = kinds[k];
                let before = l.balance();
                if is_credit {
                    l.credit(i as u64, 1, kind, d(amt), "c").unwrap();
                } else {
                    let outcome = l
                        .debit(i as u64, 1, kind, d(amt), "d")
                        .map(|t| t.balance_after);
                    match outcome {
                        Ok(after) => prop_assert!(after >= policy().floor_for(kind)),
                        Err(_) => prop_assert_eq!(l.balance(), before),
                    }
                }
                let sum: Decimal = l.entries().iter().map(|t| t.amount).sum();
                prop_assert_eq!(sum, l.balance());
            }
            prop_assert!(l.verify().is_ok());
        }
    }
}
