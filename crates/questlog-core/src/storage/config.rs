//! TOML-based reward tuning.
//!
//! Stores the knobs of the rewards engine:
//! - Base XP and gold per task, daily bonus size
//! - Level curve step and level-up payouts
//! - The UTC offset that defines a user's calendar day
//!
//! Configuration is stored at `~/.config/questlog/config.toml`.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::rewards::{
    LevelCurve, LevelProgression, RewardCalculator, RewardOrchestrator, DEFAULT_BASE_GOLD,
    DEFAULT_BASE_XP, DEFAULT_DAILY_BONUS_GOLD, DEFAULT_GOLD_PER_LEVEL,
    DEFAULT_MILESTONE_INTERVAL, DEFAULT_XP_STEP,
};
use crate::shop;

/// Per-task and daily rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_base_xp")]
    pub base_xp: u64,
    #[serde(default = "default_base_gold")]
    pub base_gold: u64,
    #[serde(default = "default_daily_bonus_gold")]
    pub daily_bonus_gold: u64,
}

/// Level curve and level-up payouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelsConfig {
    #[serde(default = "default_xp_step")]
    pub xp_step: u64,
    #[serde(default = "default_gold_per_level")]
    pub gold_per_level: u64,
    /// Grant `milestone_item` every this many levels; 0 disables it.
    #[serde(default = "default_milestone_interval")]
    pub milestone_interval: u32,
    /// Shop item id granted at milestones. Empty disables it.
    #[serde(default = "default_milestone_item")]
    pub milestone_item: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Offset from UTC, in minutes, used to decide which calendar day an
    /// activity falls on.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/questlog/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub levels: LevelsConfig,
    #[serde(default)]
    pub streak: StreakConfig,
}

// Default functions
fn default_base_xp() -> u64 {
    DEFAULT_BASE_XP
}
fn default_base_gold() -> u64 {
    DEFAULT_BASE_GOLD
}
fn default_daily_bonus_gold() -> u64 {
    DEFAULT_DAILY_BONUS_GOLD
}
fn default_xp_step() -> u64 {
    DEFAULT_XP_STEP
}
fn default_gold_per_level() -> u64 {
    DEFAULT_GOLD_PER_LEVEL
}
fn default_milestone_interval() -> u32 {
    DEFAULT_MILESTONE_INTERVAL
}
fn default_milestone_item() -> String {
    shop::STREAK_FREEZE.into()
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            base_xp: default_base_xp(),
            base_gold: default_base_gold(),
            daily_bonus_gold: default_daily_bonus_gold(),
        }
    }
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            xp_step: default_xp_step(),
            gold_per_level: default_gold_per_level(),
            milestone_interval: default_milestone_interval(),
            milestone_item: default_milestone_item(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => value
                        .parse::<bool>()
                        .map(serde_json::Value::Bool)
                        .map_err(|e| invalid(e.to_string()))?,
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or create the default file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Change a value in memory, rejecting values the engine would refuse.
    pub fn update(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.engine()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed
    /// or is out of range, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.update(key, value)?;
        self.save()
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.streak
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "streak.utc_offset_minutes".into(),
                message: format!(
                    "{} is not a valid offset (must be within +/-1439)",
                    self.streak.utc_offset_minutes
                ),
            })
    }

    fn level_progression(&self) -> Result<LevelProgression, ConfigError> {
        let curve = LevelCurve::new(self.levels.xp_step).map_err(|e| ConfigError::InvalidValue {
            key: "levels.xp_step".into(),
            message: e.to_string(),
        })?;
        let item = &self.levels.milestone_item;
        let milestone_item = if item.is_empty() {
            None
        } else if shop::default_items().iter().any(|i| &i.id == item) {
            Some(item.clone())
        } else {
            return Err(ConfigError::InvalidValue {
                key: "levels.milestone_item".into(),
                message: format!("'{item}' is not a shop item"),
            });
        };
        Ok(LevelProgression::new(curve)
            .with_gold_per_level(self.levels.gold_per_level)
            .with_milestone(self.levels.milestone_interval, milestone_item))
    }

    /// Build the rewards engine described by this configuration.
    pub fn engine(&self) -> Result<RewardOrchestrator, ConfigError> {
        let calculator = RewardCalculator::new(self.rewards.base_xp, self.rewards.base_gold)
            .map_err(|e| ConfigError::InvalidValue {
                key: "rewards".into(),
                message: e.to_string(),
            })?;
        Ok(RewardOrchestrator::default()
            .with_calculator(calculator)
            .with_levels(self.level_progression()?)
            .with_utc_offset(self.utc_offset()?)
            .with_daily_bonus(self.rewards.daily_bonus_gold))
    }
}
