use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rewards::{EffectType, Rarity, StreakTransition, TransactionType};

/// Every state change produced by the rewards engine yields an Event.
/// The UI turns these into toasts and animations; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    StreakUpdated {
        transition: StreakTransition,
        current_streak: u32,
        multiplier_percent: u32,
        at: DateTime<Utc>,
    },
    /// A missed day was absorbed by a protection unit.
    StreakProtectionUsed {
        remaining: u32,
        at: DateTime<Utc>,
    },
    GoldChanged {
        amount: i64,
        balance_after: i64,
        transaction_type: TransactionType,
        at: DateTime<Utc>,
    },
    LevelUp {
        previous_level: u32,
        new_level: u32,
        gold: u64,
        bonus_item: Option<String>,
        at: DateTime<Utc>,
    },
    AchievementUnlocked {
        achievement_id: String,
        name: String,
        rarity: Rarity,
        reward_xp: u64,
        reward_gold: u64,
        at: DateTime<Utc>,
    },
    ItemPurchased {
        item_id: String,
        quantity: u32,
        cost: u64,
        at: DateTime<Utc>,
    },
    PowerupActivated {
        item_id: String,
        effect_type: EffectType,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    DailyBonusClaimed {
        amount: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::StreakUpdated { at, .. }
            | Event::StreakProtectionUsed { at, .. }
            | Event::GoldChanged { at, .. }
            | Event::LevelUp { at, .. }
            | Event::AchievementUnlocked { at, .. }
            | Event::ItemPurchased { at, .. }
            | Event::PowerupActivated { at, .. }
            | Event::DailyBonusClaimed { at, .. } => *at,
        }
    }
}
