//! Time-bounded reward modifiers.
//!
//! Expiry is evaluated lazily: a powerup is active only while
//! `now < expires_at`, whether or not storage has deleted it yet.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calculator::Multiplier;
use crate::error::RewardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    XpMultiplier,
    GoldMultiplier,
    StreakProtection,
}

impl EffectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::XpMultiplier => "xp_multiplier",
            EffectType::GoldMultiplier => "gold_multiplier",
            EffectType::StreakProtection => "streak_protection",
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectType {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xp_multiplier" => Ok(EffectType::XpMultiplier),
            "gold_multiplier" => Ok(EffectType::GoldMultiplier),
            "streak_protection" => Ok(EffectType::StreakProtection),
            other => Err(RewardError::invalid(
                "effect_type",
                format!("unknown effect '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePowerup {
    pub id: i64,
    pub user_id: String,
    pub item_id: String,
    pub effect_type: EffectType,
    /// Multiplier factor for the multiplier effects; unused for protection.
    pub effect_value: f64,
    /// Remaining units. Only streak protection consumes units.
    pub quantity: u32,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ActivePowerup {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.quantity > 0
    }
}

/// Change to a stored powerup row caused by consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PowerupChange {
    /// The row's remaining quantity changed.
    QuantityChanged { id: i64, quantity: u32 },
    /// The last unit was used; the row should be deleted.
    Exhausted { id: i64 },
}

/// Effective modifiers at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerupEffects {
    active: Vec<ActivePowerup>,
}

impl PowerupEffects {
    /// Keep only powerups active at `now`.
    ///
    /// # Errors
    /// `InvalidInput` if an active multiplier carries an unusable factor or
    /// a row expires before it was activated.
    pub fn at(powerups: &[ActivePowerup], now: DateTime<Utc>) -> Result<Self, RewardError> {
        let mut active = Vec::new();
        for p in powerups.iter().filter(|p| p.is_active(now)) {
            if p.expires_at <= p.activated_at {
                return Err(RewardError::invalid(
                    "expires_at",
                    format!("powerup {} expires before activation", p.id),
                ));
            }
            if p.effect_type != EffectType::StreakProtection {
                Multiplier::from_factor(p.effect_value)?;
            }
            active.push(p.clone());
        }
        active.sort_by_key(|p| (p.expires_at, p.id));
        Ok(Self { active })
    }

    pub fn active(&self) -> &[ActivePowerup] {
        &self.active
    }

    fn multipliers(&self, effect: EffectType) -> Vec<Multiplier> {
        self.active
            .iter()
            .filter(|p| p.effect_type == effect)
            .filter_map(|p| Multiplier::from_factor(p.effect_value).ok())
            .collect()
    }

    pub fn xp_multipliers(&self) -> Vec<Multiplier> {
        self.multipliers(EffectType::XpMultiplier)
    }

    pub fn gold_multipliers(&self) -> Vec<Multiplier> {
        self.multipliers(EffectType::GoldMultiplier)
    }

    /// Protection units available across all active protection powerups.
    pub fn protection_available(&self) -> u32 {
        self.active
            .iter()
            .filter(|p| p.effect_type == EffectType::StreakProtection)
            .fold(0u32, |acc, p| acc.saturating_add(p.quantity))
    }

    /// Use one protection unit from the powerup that expires soonest.
    pub fn consume_protection(&mut self) -> Option<PowerupChange> {
        let p = self
            .active
            .iter_mut()
            .find(|p| p.effect_type == EffectType::StreakProtection && p.quantity > 0)?;
        p.quantity -= 1;
        let change = if p.quantity == 0 {
            PowerupChange::Exhausted { id: p.id }
        } else {
            PowerupChange::QuantityChanged {
                id: p.id,
                quantity: p.quantity,
            }
        };
        self.active.retain(|p| p.quantity > 0);
        Some(change)
    }
}
