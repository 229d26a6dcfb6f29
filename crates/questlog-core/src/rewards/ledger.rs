//! Append-only gold ledger.
//!
//! Every balance change is a signed [`GoldTransaction`] carrying the running
//! balance after it is applied. The ledger never merges deltas: one
//! orchestrated event may append several entries that share an `event_id`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RewardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    TaskReward,
    DailyBonus,
    Achievement,
    ShopPurchase,
    GoalReward,
    StreakBonus,
    LevelUp,
    Manual,
}

impl TransactionType {
    pub const ALL: [TransactionType; 8] = [
        TransactionType::TaskReward,
        TransactionType::DailyBonus,
        TransactionType::Achievement,
        TransactionType::ShopPurchase,
        TransactionType::GoalReward,
        TransactionType::StreakBonus,
        TransactionType::LevelUp,
        TransactionType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::TaskReward => "task_reward",
            TransactionType::DailyBonus => "daily_bonus",
            TransactionType::Achievement => "achievement",
            TransactionType::ShopPurchase => "shop_purchase",
            TransactionType::GoalReward => "goal_reward",
            TransactionType::StreakBonus => "streak_bonus",
            TransactionType::LevelUp => "level_up",
            TransactionType::Manual => "manual",
        }
    }

    /// Reward types only ever credit gold.
    pub fn is_reward(&self) -> bool {
        !matches!(self, TransactionType::ShopPurchase | TransactionType::Manual)
    }

    /// Spend types only ever debit gold.
    pub fn is_spend(&self) -> bool {
        matches!(self, TransactionType::ShopPurchase)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RewardError::invalid("transaction_type", format!("unknown type '{s}'")))
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldTransaction {
    pub id: Uuid,
    pub user_id: String,
    /// Signed, never zero.
    pub amount: i64,
    /// Previous entry's `balance_after` plus `amount`.
    pub balance_after: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    /// Shared by all entries produced by one orchestrated event.
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A user's ledger positioned at a known balance.
///
/// Entries appended here are pending until the caller persists them.
#[derive(Debug, Clone)]
pub struct GoldLedger {
    user_id: String,
    balance: i64,
    event_id: Uuid,
    pending: Vec<GoldTransaction>,
}

impl GoldLedger {
    pub fn new(user_id: impl Into<String>, balance: i64, event_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            balance,
            event_id,
            pending: Vec::new(),
        }
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn pending(&self) -> &[GoldTransaction] {
        &self.pending
    }

    pub fn into_entries(self) -> Vec<GoldTransaction> {
        self.pending
    }

    /// Append a signed delta.
    ///
    /// # Errors
    /// - `InvalidInput` for a zero amount, a negative reward, or a positive spend.
    /// - `InsufficientFunds` when a debit would take the balance below zero.
    ///   No entry is appended in either case.
    pub fn apply_delta(
        &mut self,
        amount: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<&GoldTransaction, RewardError> {
        if amount == 0 {
            return Err(RewardError::invalid("amount", "must be non-zero"));
        }
        if transaction_type.is_reward() && amount < 0 {
            return Err(RewardError::invalid(
                "amount",
                format!("{transaction_type} cannot debit gold ({amount})"),
            ));
        }
        if transaction_type.is_spend() && amount > 0 {
            return Err(RewardError::invalid(
                "amount",
                format!("{transaction_type} cannot credit gold ({amount})"),
            ));
        }

        let balance_after = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| RewardError::invalid("amount", "balance overflow"))?;
        if amount < 0 && balance_after < 0 {
            tracing::warn!(
                user_id = %self.user_id,
                balance = self.balance,
                requested = -amount,
                "rejecting spend: insufficient funds"
            );
            return Err(RewardError::InsufficientFunds {
                balance: self.balance,
                requested: -amount,
            });
        }

        self.balance = balance_after;
        self.pending.push(GoldTransaction {
            id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            amount,
            balance_after,
            transaction_type,
            description: description.into(),
            event_id: self.event_id,
            created_at: at,
        });
        let entry = self.pending.len() - 1;
        Ok(&self.pending[entry])
    }

    /// Credit a non-negative reward amount.
    ///
    /// Zero is a no-op: nothing is written and `None` comes back.
    pub fn credit(
        &mut self,
        amount: u64,
        transaction_type: TransactionType,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<&GoldTransaction>, RewardError> {
        if amount == 0 {
            return Ok(None);
        }
        let amount = i64::try_from(amount)
            .map_err(|_| RewardError::invalid("amount", "reward exceeds ledger range"))?;
        self.apply_delta(amount, transaction_type, description, at)
            .map(Some)
    }
}

/// Ledger chain violation found during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub index: usize,
    pub transaction_id: Uuid,
    pub expected_balance: i64,
    pub recorded_balance: i64,
}

/// Replay entries in creation order and confirm every running balance.
///
/// Returns the final balance (0 for an empty ledger).
pub fn verify_chain(entries: &[GoldTransaction]) -> Result<i64, ChainBreak> {
    let mut balance = 0i64;
    for (index, entry) in entries.iter().enumerate() {
        balance = balance.saturating_add(entry.amount);
        if entry.balance_after != balance || entry.amount == 0 {
            return Err(ChainBreak {
                index,
                transaction_id: entry.id,
                expected_balance: balance,
                recorded_balance: entry.balance_after,
            });
        }
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ledger(balance: i64) -> GoldLedger {
        GoldLedger::new("u", balance, Uuid::new_v4())
    }

    #[test]
    fn deltas_carry_running_balance() {
        let mut l = ledger(0);
        let now = Utc::now();
        l.apply_delta(25, TransactionType::TaskReward, "task", now).unwrap();
        l.apply_delta(5, TransactionType::StreakBonus, "streak", now).unwrap();
        l.apply_delta(-20, TransactionType::ShopPurchase, "xp boost", now).unwrap();
        let balances: Vec<i64> = l.pending().iter().map(|t| t.balance_after).collect();
        assert_eq!(balances, vec![25, 30, 10]);
        assert_eq!(l.balance(), 10);
        assert_eq!(verify_chain(l.pending()), Ok(10));
    }

    #[test]
    fn overspend_is_rejected_without_an_entry() {
        let mut l = ledger(40);
        let err = l
            .apply_delta(-100, TransactionType::ShopPurchase, "too pricey", Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            RewardError::InsufficientFunds {
                balance: 40,
                requested: 100
            }
        );
        assert_eq!(l.balance(), 40);
        assert!(l.pending().is_empty());
    }

    #[test]
    fn wrong_signs_and_zero_are_invalid() {
        let mut l = ledger(50);
        let now = Utc::now();
        assert!(l.apply_delta(0, TransactionType::Manual, "", now).is_err());
        assert!(l.apply_delta(-5, TransactionType::LevelUp, "", now).is_err());
        assert!(l.apply_delta(5, TransactionType::ShopPurchase, "", now).is_err());
        assert!(l.pending().is_empty());
    }

    #[test]
    fn manual_adjustments_go_both_ways() {
        let mut l = ledger(10);
        let now = Utc::now();
        l.apply_delta(-10, TransactionType::Manual, "correction", now).unwrap();
        assert!(l.apply_delta(-1, TransactionType::Manual, "again", now).is_err());
        l.apply_delta(3, TransactionType::Manual, "refund", now).unwrap();
        assert_eq!(l.balance(), 3);
    }

    #[test]
    fn zero_credit_writes_nothing() {
        let mut l = ledger(0);
        assert!(l
            .credit(0, TransactionType::StreakBonus, "none", Utc::now())
            .unwrap()
            .is_none());
        assert!(l.pending().is_empty());
        let entry = l
            .credit(15, TransactionType::StreakBonus, "two days", Utc::now())
            .unwrap()
            .cloned();
        assert_eq!(entry.map(|e| e.balance_after), Some(15));
        assert!(l.credit(u64::MAX, TransactionType::TaskReward, "huge", Utc::now()).is_err());
        assert_eq!(l.pending().len(), 1);
    }

    #[test]
    fn entries_share_the_event_id() {
        let event = Uuid::new_v4();
        let mut l = GoldLedger::new("u", 0, event);
        let now = Utc::now();
        l.credit(10, TransactionType::TaskReward, "a", now).unwrap();
        l.credit(40, TransactionType::LevelUp, "b", now).unwrap();
        assert!(l.pending().iter().all(|t| t.event_id == event));
    }

    #[test]
    fn tampered_chain_is_detected() {
        let mut l = ledger(0);
        let now = Utc::now();
        l.credit(10, TransactionType::TaskReward, "a", now).unwrap();
        l.credit(10, TransactionType::TaskReward, "b", now).unwrap();
        let mut entries = l.into_entries();
        entries[1].balance_after = 25;
        let err = verify_chain(&entries).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.expected_balance, 20);
    }

    #[test]
    fn transaction_type_parses_its_own_name() {
        for t in TransactionType::ALL {
            assert_eq!(t.as_str().parse::<TransactionType>().unwrap(), t);
        }
        assert!("refund".parse::<TransactionType>().is_err());
    }

    proptest! {
        #[test]
        fn replay_reproduces_final_balance(deltas in proptest::collection::vec(-50i64..100, 1..80)) {
            let mut l = ledger(0);
            let now = Utc::now();
            for d in deltas {
                let kind = if d < 0 { TransactionType::ShopPurchase } else { TransactionType::TaskReward };
                // rejected deltas leave the ledger untouched
                let _ = l.apply_delta(d, kind, "p", now);
            }
            let sum: i64 = l.pending().iter().map(|t| t.amount).sum();
            prop_assert_eq!(verify_chain(l.pending()), Ok(l.balance()));
            prop_assert_eq!(sum, l.balance());
            prop_assert!(l.balance() >= 0);
        }
    }
}
