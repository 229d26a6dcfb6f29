//! # Questlog Core Library
//!
//! This library provides the gamification core of the Questlog task manager:
//! completing tasks grants XP and gold, XP accumulation triggers level-ups,
//! consecutive daily activity builds a streak that multiplies rewards, and
//! milestone achievements unlock from cumulative progress.
//!
//! ## Architecture
//!
//! - **Rewards engine**: a synchronous, side-effect-free transformation from a
//!   user snapshot plus one event to a new snapshot and append-only rows
//! - **Shop**: gold spending and powerup inventory
//! - **Storage**: SQLite persistence that commits an engine outcome atomically,
//!   and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`RewardOrchestrator`]: entry point invoked on task completion
//! - [`GoldLedger`]: append-only gold transaction log
//! - [`Database`]: snapshot loading and transactional commits
//! - [`Config`]: reward tuning and data location

pub mod error;
pub mod events;
pub mod progress;
pub mod rewards;
pub mod shop;
pub mod storage;

pub use error::{ConfigError, CoreError, DatabaseError, RewardError};
pub use events::Event;
pub use progress::UserProgress;
pub use rewards::{
    Achievement, ActivePowerup, Difficulty, EffectType, GoldLedger, GoldTransaction,
    LevelCurve, LevelHistoryRecord, LevelProgression, RewardCalculator, RewardOrchestrator,
    RewardOutcome, RewardSnapshot, RewardSummary, StreakTracker, TaskCompletion,
    TransactionType, UserAchievement,
};
pub use shop::{InventoryItem, Shop, ShopItem};
pub use storage::{Config, Database};
