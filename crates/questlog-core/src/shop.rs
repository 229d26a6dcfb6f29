//! Gold shop and powerup inventory.
//!
//! Purchases debit the ledger and add items to the inventory; activating an
//! inventory item turns it into a time-bounded [`ActivePowerup`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RewardError;
use crate::events::Event;
use crate::rewards::orchestrator::Transition;
use crate::rewards::{
    ActivePowerup, EffectType, Multiplier, PowerupChange, RewardOutcome,
    RewardSnapshot, TransactionType,
};

pub const XP_BOOST: &str = "xp_boost";
pub const GOLD_BOOST: &str = "gold_boost";
pub const STREAK_FREEZE: &str = "streak_freeze";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: u64,
    pub effect_type: EffectType,
    pub effect_value: f64,
    pub duration_hours: i64,
}

pub fn default_items() -> Vec<ShopItem> {
    vec![
        ShopItem {
            id: XP_BOOST.to_string(),
            name: "XP Boost".to_string(),
            description: "1.5x XP for 24 hours".to_string(),
            price: 100,
            effect_type: EffectType::XpMultiplier,
            effect_value: 1.5,
            duration_hours: 24,
        },
        ShopItem {
            id: GOLD_BOOST.to_string(),
            name: "Gold Boost".to_string(),
            description: "1.5x gold for 24 hours".to_string(),
            price: 120,
            effect_type: EffectType::GoldMultiplier,
            effect_value: 1.5,
            duration_hours: 24,
        },
        ShopItem {
            id: STREAK_FREEZE.to_string(),
            name: "Streak Freeze".to_string(),
            description: "Covers one missed day within the next week".to_string(),
            price: 150,
            effect_type: EffectType::StreakProtection,
            effect_value: 1.0,
            duration_hours: 24 * 7,
        },
    ]
}

/// Items a user owns but has not activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub user_id: String,
    pub item_id: String,
    pub quantity: u32,
}

/// Signed change to an inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryChange {
    pub user_id: String,
    pub item_id: String,
    pub delta: i64,
}

#[derive(Debug, Clone)]
pub struct Shop {
    items: Vec<ShopItem>,
}

impl Shop {
    pub fn new(items: Vec<ShopItem>) -> Result<Self, RewardError> {
        for item in &items {
            if item.price == 0 {
                return Err(RewardError::invalid(
                    "price",
                    format!("item '{}' must cost something", item.id),
                ));
            }
            if item.duration_hours <= 0 {
                return Err(RewardError::invalid(
                    "duration_hours",
                    format!("item '{}' must last a positive duration", item.id),
                ));
            }
            if item.effect_type != EffectType::StreakProtection {
                Multiplier::from_factor(item.effect_value)?;
            }
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[ShopItem] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> Result<&ShopItem, RewardError> {
        self.items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| RewardError::invalid("item_id", format!("unknown item '{item_id}'")))
    }

    /// Buy `quantity` units of an item.
    ///
    /// # Errors
    /// `InsufficientFunds` if the balance does not cover the cost; nothing is
    /// debited and no inventory is granted.
    pub fn purchase(
        &self,
        snapshot: &RewardSnapshot,
        item_id: &str,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<RewardOutcome, RewardError> {
        if quantity == 0 {
            return Err(RewardError::invalid("quantity", "must be at least 1"));
        }
        let item = self.item(item_id)?;
        let cost = item
            .price
            .checked_mul(quantity as u64)
            .and_then(|c| i64::try_from(c).ok())
            .ok_or_else(|| RewardError::invalid("quantity", "total cost out of range"))?;

        let mut tx = Transition::begin(snapshot, now)?;
        tx.ledger_delta(
            -cost,
            TransactionType::ShopPurchase,
            format!("Bought {quantity} x {}", item.name),
        )?;
        tx.change_inventory(&item.id, quantity as i64);
        tx.push_event(Event::ItemPurchased {
            item_id: item.id.clone(),
            quantity,
            cost: cost as u64,
            at: now,
        });
        tracing::info!(user_id = %tx.user_id(), item = %item.id, quantity, cost, "item purchased");
        Ok(tx.finish())
    }

    /// Activate one owned unit of an item.
    ///
    /// Streak protection stacks onto an already-active protection powerup of
    /// the same item; multipliers always start a new powerup.
    pub fn activate(
        &self,
        snapshot: &RewardSnapshot,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RewardOutcome, RewardError> {
        let item = self.item(item_id)?;
        let owned = snapshot
            .inventory
            .iter()
            .filter(|i| i.user_id == snapshot.user_id() && i.item_id == item.id)
            .map(|i| i.quantity)
            .sum::<u32>();
        if owned == 0 {
            return Err(RewardError::invalid(
                "item_id",
                format!("no '{}' in inventory", item.id),
            ));
        }

        let mut tx = Transition::begin(snapshot, now)?;
        tx.change_inventory(&item.id, -1);

        let stack_onto = (item.effect_type == EffectType::StreakProtection)
            .then(|| {
                snapshot.powerups.iter().find(|p| {
                    p.item_id == item.id
                        && p.effect_type == EffectType::StreakProtection
                        && p.is_active(now)
                })
            })
            .flatten();

        let expires_at = match stack_onto {
            Some(existing) => {
                tx.change_powerup(PowerupChange::QuantityChanged {
                    id: existing.id,
                    quantity: existing.quantity.saturating_add(1),
                });
                existing.expires_at
            }
            None => {
                let expires_at = now + Duration::hours(item.duration_hours);
                let powerup = ActivePowerup {
                    id: 0,
                    user_id: tx.user_id(),
                    item_id: item.id.clone(),
                    effect_type: item.effect_type,
                    effect_value: item.effect_value,
                    quantity: 1,
                    activated_at: tx.at(),
                    expires_at,
                };
                tracing::info!(user_id = %powerup.user_id, item = %item.id, %expires_at, "powerup activated");
                tx.activate_powerup(powerup);
                expires_at
            }
        };
        tx.push_event(Event::PowerupActivated {
            item_id: item.id.clone(),
            effect_type: item.effect_type,
            expires_at,
            at: now,
        });
        Ok(tx.finish())
    }
}

impl Default for Shop {
    fn default() -> Self {
        Self {
            items: default_items(),
        }
    }
}
