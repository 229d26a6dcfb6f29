//! Gamification rewards engine.
//!
//! Turns a single "task completed" event into a consistent update of a
//! user's XP, level, gold, streak and achievement state.

mod achievements;
mod calculator;
mod ledger;
mod level;
pub(crate) mod orchestrator;
mod powerups;
mod streak;

pub use achievements::{
    default_catalog, merge_rows, validate_catalog, Achievement, AchievementCategory,
    AchievementCounters, AchievementEngine, AchievementEvaluation, AchievementTrigger, Rarity,
    RequirementType, UserAchievement,
};
pub use calculator::{
    Difficulty, Multiplier, Reward, RewardCalculator, DEFAULT_BASE_GOLD, DEFAULT_BASE_XP,
};
pub use ledger::{verify_chain, ChainBreak, GoldLedger, GoldTransaction, TransactionType};
pub use level::{
    LevelCurve, LevelHistoryRecord, LevelProgression, LevelUpReward, XpApplication,
    DEFAULT_GOLD_PER_LEVEL, DEFAULT_MILESTONE_INTERVAL, DEFAULT_XP_STEP,
};
pub use orchestrator::{
    RewardOrchestrator, RewardOutcome, RewardSnapshot, RewardSummary, TaskCompletion,
    DEFAULT_DAILY_BONUS_GOLD,
};
pub use powerups::{ActivePowerup, EffectType, PowerupChange, PowerupEffects};
pub use streak::{StreakState, StreakTier, StreakTracker, StreakTransition, StreakUpdate};
