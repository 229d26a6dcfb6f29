//! XP to level conversion and level-up detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RewardError;

pub const DEFAULT_XP_STEP: u64 = 100;
pub const DEFAULT_GOLD_PER_LEVEL: u64 = 10;
pub const DEFAULT_MILESTONE_INTERVAL: u32 = 5;

/// Cumulative level curve: advancing from level `n` to `n + 1` costs
/// `n * xp_step` XP.
///
/// With the default step of 100 the thresholds are 0, 100, 300, 600, 1000, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCurve {
    xp_step: u64,
}

impl LevelCurve {
    pub fn new(xp_step: u64) -> Result<Self, RewardError> {
        if xp_step == 0 {
            return Err(RewardError::invalid("xp_step", "must be positive"));
        }
        Ok(Self { xp_step })
    }

    pub fn xp_step(&self) -> u64 {
        self.xp_step
    }

    /// XP needed to advance from `level` to `level + 1`.
    pub fn required_for_level(&self, level: u32) -> u64 {
        (level as u64).saturating_mul(self.xp_step)
    }

    /// Cumulative XP at which `level` is reached. Level 1 starts at 0.
    pub fn xp_for_level(&self, level: u32) -> u64 {
        let n = level.saturating_sub(1) as u64;
        // step * n(n+1)/2
        (n.saturating_mul(n.saturating_add(1)) / 2).saturating_mul(self.xp_step)
    }

    pub fn level_for_xp(&self, total_xp: u64) -> u32 {
        let mut level: u32 = 1;
        let mut threshold: u64 = 0;
        loop {
            let next = threshold.saturating_add(self.required_for_level(level));
            if next > total_xp || next == threshold || level == u32::MAX {
                return level;
            }
            threshold = next;
            level += 1;
        }
    }

    /// `(xp into the current level, xp the current level spans)`.
    pub fn progress_in_level(&self, total_xp: u64) -> (u64, u64) {
        let level = self.level_for_xp(total_xp);
        let floor = self.xp_for_level(level);
        (total_xp - floor, self.required_for_level(level))
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            xp_step: DEFAULT_XP_STEP,
        }
    }
}

/// Append-only record of a single level crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHistoryRecord {
    pub user_id: String,
    pub previous_level: u32,
    /// Always `previous_level + 1`.
    pub new_level: u32,
    /// The curve threshold for `new_level`: where the level was crossed,
    /// not where the XP gain ended.
    pub total_xp_at_levelup: u64,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Reward for reaching one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpReward {
    pub level: u32,
    pub gold: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_item: Option<String>,
}

/// Outcome of adding XP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpApplication {
    pub old_level: u32,
    pub new_level: u32,
    pub new_total_xp: u64,
    pub records: Vec<LevelHistoryRecord>,
    pub rewards: Vec<LevelUpReward>,
}

impl XpApplication {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Applies XP gains and prices level-ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelProgression {
    curve: LevelCurve,
    gold_per_level: u64,
    milestone_interval: u32,
    milestone_item: Option<String>,
}

impl LevelProgression {
    pub fn new(curve: LevelCurve) -> Self {
        Self {
            curve,
            gold_per_level: DEFAULT_GOLD_PER_LEVEL,
            milestone_interval: DEFAULT_MILESTONE_INTERVAL,
            milestone_item: Some(crate::shop::STREAK_FREEZE.to_string()),
        }
    }

    pub fn with_gold_per_level(mut self, gold: u64) -> Self {
        self.gold_per_level = gold;
        self
    }

    /// Grant `item` every `interval` levels. An interval of 0 disables grants.
    pub fn with_milestone(mut self, interval: u32, item: Option<String>) -> Self {
        self.milestone_interval = interval;
        self.milestone_item = item;
        self
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    pub fn level_for_xp(&self, total_xp: u64) -> u32 {
        self.curve.level_for_xp(total_xp)
    }

    pub fn reward_for_level(&self, level: u32) -> LevelUpReward {
        let milestone = self.milestone_interval > 0 && level % self.milestone_interval == 0;
        LevelUpReward {
            level,
            gold: (level as u64).saturating_mul(self.gold_per_level),
            bonus_item: if milestone {
                self.milestone_item.clone()
            } else {
                None
            },
        }
    }

    /// Add `xp_gained` to `old_xp`, emitting one history record and one
    /// reward per level crossed.
    ///
    /// `current_level` is the stored level; the result never goes below it
    /// even if the curve has since been retuned.
    pub fn apply_xp(
        &self,
        user_id: &str,
        current_level: u32,
        old_xp: u64,
        xp_gained: u64,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> XpApplication {
        let old_level = self.level_for_xp(old_xp).max(current_level).max(1);
        let new_total_xp = old_xp.saturating_add(xp_gained);
        let new_level = self.level_for_xp(new_total_xp).max(old_level);

        let mut records = Vec::new();
        let mut rewards = Vec::new();
        for previous in old_level..new_level {
            let reached = previous + 1;
            records.push(LevelHistoryRecord {
                user_id: user_id.to_string(),
                previous_level: previous,
                new_level: reached,
                total_xp_at_levelup: self.curve.xp_for_level(reached),
                event_id,
                created_at: at,
            });
            rewards.push(self.reward_for_level(reached));
        }

        XpApplication {
            old_level,
            new_level,
            new_total_xp,
            records,
            rewards,
        }
    }
}

impl Default for LevelProgression {
    fn default() -> Self {
        Self::new(LevelCurve::default())
    }
}
