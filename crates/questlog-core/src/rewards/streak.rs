//! Daily activity streaks.
//!
//! A streak counts consecutive calendar days with at least one completed
//! task. One missed day can be bridged by a streak protection unit; longer
//! gaps always reset the streak. The tier reached by the current streak sets
//! the reward multiplier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calculator::Multiplier;
use crate::error::RewardError;

/// Multiplier tier derived from the current streak length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTier {
    /// Fewer than 7 days
    None,
    /// 7..=13 days
    Week,
    /// 14..=29 days
    Fortnight,
    /// 30 days or more
    Month,
}

impl StreakTier {
    pub fn for_streak(streak: u32) -> Self {
        match streak {
            0..=6 => StreakTier::None,
            7..=13 => StreakTier::Week,
            14..=29 => StreakTier::Fortnight,
            _ => StreakTier::Month,
        }
    }

    pub fn multiplier(self) -> Multiplier {
        match self {
            StreakTier::None => Multiplier::ONE,
            StreakTier::Week => Multiplier::from_percent(120),
            StreakTier::Fortnight => Multiplier::from_percent(150),
            StreakTier::Month => Multiplier::from_percent(200),
        }
    }
}

/// How an activity date related to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// No previous activity on record
    FirstActivity,
    /// Already active on this date; nothing changes
    SameDay,
    /// Active on the previous day
    Consecutive,
    /// Exactly one missed day, absorbed by a protection unit
    Protected,
    /// Gap that could not be bridged
    Reset,
}

impl StreakTransition {
    pub fn description(&self) -> &'static str {
        match self {
            StreakTransition::FirstActivity => "First day of activity",
            StreakTransition::SameDay => "Already counted today",
            StreakTransition::Consecutive => "Streak extended",
            StreakTransition::Protected => "Missed day covered by streak protection",
            StreakTransition::Reset => "Streak broken, starting over",
        }
    }
}

/// Streak fields of a user's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

/// Result of evaluating one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub transition: StreakTransition,
    pub state: StreakState,
    /// Whether one protection unit must be consumed.
    pub protection_consumed: bool,
    pub tier: StreakTier,
}

impl StreakUpdate {
    pub fn multiplier(&self) -> Multiplier {
        self.tier.multiplier()
    }
}

/// Streak state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreakTracker;

impl StreakTracker {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate activity on `activity_date`, given the server's current date
    /// `today` and the number of protection units available.
    ///
    /// # Errors
    /// `ClockSkew` if the last recorded activity or the activity itself lies
    /// after `today`, or if the activity precedes the last recorded activity.
    pub fn record_activity(
        &self,
        state: StreakState,
        activity_date: NaiveDate,
        today: NaiveDate,
        protection_available: u32,
    ) -> Result<StreakUpdate, RewardError> {
        let skew = || RewardError::ClockSkew {
            last_activity: state.last_activity_date,
            activity_date,
            today,
        };

        if activity_date > today {
            return Err(skew());
        }

        let (transition, current) = match state.last_activity_date {
            None => (StreakTransition::FirstActivity, 1),
            Some(last) => {
                if last > today || activity_date < last {
                    return Err(skew());
                }
                match (activity_date - last).num_days() {
                    0 => (StreakTransition::SameDay, state.current_streak),
                    1 => (
                        StreakTransition::Consecutive,
                        state.current_streak.saturating_add(1),
                    ),
                    2 if protection_available > 0 => {
                        (StreakTransition::Protected, state.current_streak)
                    }
                    _ => (StreakTransition::Reset, 1),
                }
            }
        };

        let new_state = StreakState {
            current_streak: current,
            longest_streak: state.longest_streak.max(current),
            last_activity_date: Some(activity_date),
        };

        Ok(StreakUpdate {
            transition,
            state: new_state,
            protection_consumed: transition == StreakTransition::Protected,
            tier: StreakTier::for_streak(current),
        })
    }
}
