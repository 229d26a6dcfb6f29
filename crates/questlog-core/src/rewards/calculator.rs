//! Base reward table.
//!
//! A task's difficulty maps to a fixed multiplier which is applied to the
//! configured base XP and gold and floored. Nothing here depends on user
//! state.

use serde::{Deserialize, Serialize};

use crate::error::RewardError;

pub const DEFAULT_BASE_XP: u64 = 10;
pub const DEFAULT_BASE_GOLD: u64 = 5;

/// Task difficulty, 1 (trivial) through 5 (epic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, RewardError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RewardError::invalid(
                "difficulty",
                format!("{value} is outside {}..={}", Self::MIN, Self::MAX),
            ))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Fixed reward multiplier for this difficulty.
    pub fn multiplier(self) -> Multiplier {
        match self.0 {
            1 => Multiplier::ONE,
            2 => Multiplier::from_percent(150),
            3 => Multiplier::from_percent(200),
            4 => Multiplier::from_percent(300),
            _ => Multiplier::from_percent(500),
        }
    }

    pub fn all() -> impl Iterator<Item = Difficulty> {
        (Self::MIN..=Self::MAX).map(Difficulty)
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = RewardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Difficulty::new(value)
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> Self {
        d.0
    }
}

/// A reward multiplier held as an integer percentage (120 = 1.2x), so
/// stacking and flooring stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_percent(percent: u32) -> Self {
        Self(percent)
    }

    /// Convert a stored factor such as `1.5` into a multiplier.
    ///
    /// Rejects non-finite and non-positive factors instead of clamping them.
    pub fn from_factor(factor: f64) -> Result<Self, RewardError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RewardError::invalid(
                "effect_value",
                format!("multiplier {factor} must be a positive finite number"),
            ));
        }
        let percent = (factor * 100.0).round();
        if percent < 1.0 || percent > u32::MAX as f64 {
            return Err(RewardError::invalid(
                "effect_value",
                format!("multiplier {factor} is out of range"),
            ));
        }
        Ok(Self(percent as u32))
    }

    pub fn percent(self) -> u32 {
        self.0
    }

    pub fn factor(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// `floor(amount * m1 * m2 * ...)`, computed without intermediate rounding.
    pub fn apply_all(amount: u64, multipliers: &[Multiplier]) -> u64 {
        let mut numerator = amount as u128;
        let mut denominator = 1u128;
        for m in multipliers {
            numerator = numerator.saturating_mul(m.0 as u128);
            denominator = denominator.saturating_mul(100);
        }
        u64::try_from(numerator / denominator).unwrap_or(u64::MAX)
    }

    pub fn apply(self, amount: u64) -> u64 {
        Self::apply_all(amount, &[self])
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Multiplier::ONE
    }
}

/// An XP/gold pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reward {
    pub xp: u64,
    pub gold: u64,
}

/// Maps difficulty to base reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardCalculator {
    base_xp: u64,
    base_gold: u64,
}

impl RewardCalculator {
    /// Bases below 2 would make neighbouring difficulties floor to the same
    /// reward, so they are rejected.
    pub fn new(base_xp: u64, base_gold: u64) -> Result<Self, RewardError> {
        if base_xp < 2 {
            return Err(RewardError::invalid("base_xp", "must be at least 2"));
        }
        if base_gold < 2 {
            return Err(RewardError::invalid("base_gold", "must be at least 2"));
        }
        Ok(Self { base_xp, base_gold })
    }

    pub fn base_reward(&self, difficulty: Difficulty) -> Reward {
        let m = difficulty.multiplier();
        Reward {
            xp: m.apply(self.base_xp),
            gold: m.apply(self.base_gold),
        }
    }

    /// Validate a raw difficulty and compute its reward.
    pub fn reward_for(&self, difficulty: u8) -> Result<Reward, RewardError> {
        Ok(self.base_reward(Difficulty::new(difficulty)?))
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self {
            base_xp: DEFAULT_BASE_XP,
            base_gold: DEFAULT_BASE_GOLD,
        }
    }
}
