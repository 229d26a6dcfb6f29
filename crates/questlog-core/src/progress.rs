//! Per-user progress snapshot.
//!
//! `UserProgress` is only ever replaced wholesale by the rewards engine; the
//! storage layer reads it, hands it to the engine, and writes back the
//! updated copy guarded by `version`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RewardError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    /// Cumulative XP. Never decreases.
    pub total_xp: u64,
    /// Derived from `total_xp` through the level curve. Always >= 1.
    pub level: u32,
    pub gold_balance: i64,
    pub current_streak: u32,
    /// Always >= `current_streak`.
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_daily_bonus: Option<NaiveDate>,
    #[serde(default)]
    pub tasks_completed: u64,
    /// Optimistic concurrency token, bumped on every committed update.
    #[serde(default)]
    pub version: u64,
}

impl UserProgress {
    /// Fresh progress for a user with no history.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_xp: 0,
            level: 1,
            gold_balance: 0,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            last_daily_bonus: None,
            tasks_completed: 0,
            version: 0,
        }
    }

    /// Reject snapshots that already violate the progress invariants.
    pub fn check(&self) -> Result<(), RewardError> {
        if self.user_id.is_empty() {
            return Err(RewardError::invalid("user_id", "must not be empty"));
        }
        if self.level == 0 {
            return Err(RewardError::invalid("level", "must be at least 1"));
        }
        if self.gold_balance < 0 {
            return Err(RewardError::invalid(
                "gold_balance",
                format!("persisted balance is negative ({})", self.gold_balance),
            ));
        }
        if self.longest_streak < self.current_streak {
            return Err(RewardError::invalid(
                "longest_streak",
                format!(
                    "{} is below current streak {}",
                    self.longest_streak, self.current_streak
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_starts_at_level_one() {
        let p = UserProgress::new("alice");
        assert_eq!(p.level, 1);
        assert_eq!(p.total_xp, 0);
        assert!(p.last_activity_date.is_none());
        assert!(p.check().is_ok());
    }

    #[test]
    fn check_rejects_broken_streak_invariant() {
        let mut p = UserProgress::new("alice");
        p.current_streak = 5;
        p.longest_streak = 3;
        assert!(matches!(
            p.check(),
            Err(RewardError::InvalidInput { ref field, .. }) if field == "longest_streak"
        ));
    }

    #[test]
    fn check_rejects_negative_balance() {
        let mut p = UserProgress::new("alice");
        p.gold_balance = -1;
        assert!(p.check().is_err());
    }
}
