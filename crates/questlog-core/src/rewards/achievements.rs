//! Milestone achievements.
//!
//! Achievements are static catalog entries with a counter threshold. Per-user
//! rows are created lazily the first time a counter makes progress, and the
//! unlock transition happens at most once per user and achievement.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RewardError;
use crate::progress::UserProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Tasks,
    Streaks,
    Social,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Counter an achievement's threshold is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    TasksCompleted,
    StreakDays,
    LongestStreak,
    LevelReached,
    TotalXp,
    FriendsAdded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: AchievementCategory,
    pub requirement_type: RequirementType,
    pub requirement_value: u64,
    pub reward_xp: u64,
    pub reward_gold: u64,
    pub rarity: Rarity,
}

impl Achievement {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: &str,
        name: &str,
        description: &str,
        category: AchievementCategory,
        requirement_type: RequirementType,
        requirement_value: u64,
        reward: (u64, u64),
        rarity: Rarity,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category,
            requirement_type,
            requirement_value,
            reward_xp: reward.0,
            reward_gold: reward.1,
            rarity,
        }
    }
}

/// Built-in achievement catalog.
#[rustfmt::skip]
pub fn default_catalog() -> Vec<Achievement> {
    use AchievementCategory::*;
    use Rarity::*;
    use RequirementType::*;
    vec![
        // Task milestones
        Achievement::new("first_task", "First Step", "Complete your first task", Tasks, TasksCompleted, 1, (10, 5), Common),
        Achievement::new("ten_tasks", "Getting Things Done", "Complete 10 tasks", Tasks, TasksCompleted, 10, (50, 25), Common),
        Achievement::new("fifty_tasks", "Taskmaster", "Complete 50 tasks", Tasks, TasksCompleted, 50, (150, 75), Rare),
        Achievement::new("hundred_tasks", "Centurion", "Complete 100 tasks", Tasks, TasksCompleted, 100, (300, 150), Epic),
        Achievement::new("thousand_tasks", "Unstoppable", "Complete 1000 tasks", Tasks, TasksCompleted, 1000, (2000, 1000), Legendary),

        // Streaks
        Achievement::new("streak_3", "On Fire", "Stay active 3 days in a row", Streaks, StreakDays, 3, (20, 10), Common),
        Achievement::new("streak_7", "Week Warrior", "Stay active 7 days in a row", Streaks, StreakDays, 7, (70, 35), Rare),
        Achievement::new("streak_30", "Monthly Master", "Stay active 30 days in a row", Streaks, StreakDays, 30, (300, 150), Epic),
        Achievement::new("streak_100", "Habit Forged", "Reach a 100 day streak", Streaks, LongestStreak, 100, (1000, 500), Legendary),

        // Social
        Achievement::new("first_friend", "Better Together", "Add your first friend", Social, FriendsAdded, 1, (20, 10), Common),
        Achievement::new("five_friends", "Party Up", "Add 5 friends", Social, FriendsAdded, 5, (60, 30), Rare),

        // Special
        Achievement::new("level_10", "Seasoned", "Reach level 10", Special, LevelReached, 10, (0, 100), Rare),
        Achievement::new("xp_10000", "Ten Thousand", "Earn 10000 XP", Special, TotalXp, 10_000, (0, 250), Epic),
    ]
}

/// Reject catalogs with duplicate ids or non-positive thresholds.
pub fn validate_catalog(catalog: &[Achievement]) -> Result<(), RewardError> {
    let mut seen = HashMap::new();
    for a in catalog {
        if a.requirement_value == 0 {
            return Err(RewardError::invalid(
                "requirement_value",
                format!("achievement '{}' has a zero threshold", a.id),
            ));
        }
        if seen.insert(a.id.as_str(), ()).is_some() {
            return Err(RewardError::invalid(
                "id",
                format!("duplicate achievement '{}'", a.id),
            ));
        }
    }
    Ok(())
}

/// Per-user progress towards one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: String,
    pub achievement_id: String,
    /// `0 <= progress <= requirement_value`
    pub progress: u64,
    pub is_unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// The event an evaluation is responding to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementTrigger {
    TaskCompleted,
    FriendAdded,
    /// Total XP or level moved.
    XpGained,
    /// Re-evaluate every category.
    Full,
}

impl AchievementTrigger {
    pub fn covers(&self, category: AchievementCategory) -> bool {
        match self {
            AchievementTrigger::TaskCompleted => matches!(
                category,
                AchievementCategory::Tasks | AchievementCategory::Streaks
            ),
            AchievementTrigger::FriendAdded => category == AchievementCategory::Social,
            AchievementTrigger::XpGained => category == AchievementCategory::Special,
            AchievementTrigger::Full => true,
        }
    }
}

/// Cumulative counters achievements are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AchievementCounters {
    pub tasks_completed: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub level: u32,
    pub total_xp: u64,
    /// `None` when the social graph was not consulted.
    pub friends_added: Option<u64>,
}

impl AchievementCounters {
    pub fn from_progress(progress: &UserProgress) -> Self {
        Self {
            tasks_completed: progress.tasks_completed,
            current_streak: progress.current_streak,
            longest_streak: progress.longest_streak,
            level: progress.level,
            total_xp: progress.total_xp,
            friends_added: None,
        }
    }

    pub fn with_friends(mut self, friends_added: u64) -> Self {
        self.friends_added = Some(friends_added);
        self
    }

    /// Current value of a counter, or `None` if it is unknown.
    pub fn value(&self, requirement: RequirementType) -> Option<u64> {
        match requirement {
            RequirementType::TasksCompleted => Some(self.tasks_completed),
            RequirementType::StreakDays => Some(self.current_streak as u64),
            RequirementType::LongestStreak => Some(self.longest_streak as u64),
            RequirementType::LevelReached => Some(self.level as u64),
            RequirementType::TotalXp => Some(self.total_xp),
            RequirementType::FriendsAdded => self.friends_added,
        }
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementEvaluation {
    /// Rows created or modified by this pass.
    pub updated: Vec<UserAchievement>,
    /// Achievements that transitioned to unlocked in this pass.
    pub unlocked: Vec<Achievement>,
}

impl AchievementEvaluation {
    pub fn reward_xp(&self) -> u64 {
        self.unlocked.iter().map(|a| a.reward_xp).sum()
    }

    pub fn reward_gold(&self) -> u64 {
        self.unlocked.iter().map(|a| a.reward_gold).sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AchievementEngine;

impl AchievementEngine {
    pub fn new() -> Self {
        Self
    }

    /// Re-evaluate the catalog entries covered by `trigger`.
    ///
    /// Already-unlocked rows are never touched, so repeated evaluation of the
    /// same snapshot yields no further changes and no duplicate rewards.
    /// Entries measured against an unknown counter keep their stored row.
    pub fn evaluate(
        &self,
        user_id: &str,
        catalog: &[Achievement],
        rows: &[UserAchievement],
        counters: &AchievementCounters,
        trigger: AchievementTrigger,
        now: DateTime<Utc>,
    ) -> Result<AchievementEvaluation, RewardError> {
        validate_catalog(catalog)?;
        let existing: HashMap<&str, &UserAchievement> = rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| (r.achievement_id.as_str(), r))
            .collect();

        let mut evaluation = AchievementEvaluation::default();
        for achievement in catalog.iter().filter(|a| trigger.covers(a.category)) {
            let current = existing.get(achievement.id.as_str()).copied();
            if current.is_some_and(|r| r.is_unlocked) {
                continue;
            }

            let Some(counter) = counters.value(achievement.requirement_type) else {
                continue;
            };
            let progress = counter.min(achievement.requirement_value);
            let unlocks = progress >= achievement.requirement_value;

            let unchanged = match current {
                Some(row) => row.progress == progress && !unlocks,
                None => progress == 0,
            };
            if unchanged {
                continue;
            }

            evaluation.updated.push(UserAchievement {
                user_id: user_id.to_string(),
                achievement_id: achievement.id.clone(),
                progress,
                is_unlocked: unlocks,
                unlocked_at: unlocks.then_some(now),
            });
            if unlocks {
                tracing::info!(user_id, achievement = %achievement.id, "achievement unlocked");
                evaluation.unlocked.push(achievement.clone());
            }
        }
        Ok(evaluation)
    }
}

/// Overlay `updated` onto `rows`, replacing rows with the same achievement id.
pub fn merge_rows(rows: &[UserAchievement], updated: &[UserAchievement]) -> Vec<UserAchievement> {
    let mut merged: Vec<UserAchievement> = rows.to_vec();
    for row in updated {
        match merged
            .iter_mut()
            .find(|r| r.user_id == row.user_id && r.achievement_id == row.achievement_id)
        {
            Some(slot) => *slot = row.clone(),
            None => merged.push(row.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(tasks: u64, streak: u32) -> AchievementCounters {
        AchievementCounters {
            tasks_completed: tasks,
            current_streak: streak,
            longest_streak: streak,
            level: 1,
            total_xp: 0,
            friends_added: None,
        }
    }

    #[test]
    fn default_catalog_is_valid() {
        assert!(validate_catalog(&default_catalog()).is_ok());
    }

    #[test]
    fn first_task_unlocks_and_others_progress() {
        let catalog = default_catalog();
        let eval = AchievementEngine::new()
            .evaluate("u", &catalog, &[], &counters(1, 1), AchievementTrigger::TaskCompleted, Utc::now())
            .unwrap();
        let unlocked: Vec<&str> = eval.unlocked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(unlocked, vec!["first_task"]);
        let ten = eval.updated.iter().find(|r| r.achievement_id == "ten_tasks").unwrap();
        assert_eq!(ten.progress, 1);
        assert!(!ten.is_unlocked);
        assert_eq!(eval.reward_xp(), 10);
        assert_eq!(eval.reward_gold(), 5);
    }

    #[test]
    fn progress_is_capped_at_requirement() {
        let catalog = default_catalog();
        let eval = AchievementEngine::new()
            .evaluate("u", &catalog, &[], &counters(75, 0), AchievementTrigger::TaskCompleted, Utc::now())
            .unwrap();
        let fifty = eval.updated.iter().find(|r| r.achievement_id == "fifty_tasks").unwrap();
        assert_eq!(fifty.progress, 50);
        assert!(fifty.is_unlocked);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let catalog = default_catalog();
        let engine = AchievementEngine::new();
        let now = Utc::now();
        let c = counters(10, 7);

        let first = engine
            .evaluate("u", &catalog, &[], &c, AchievementTrigger::TaskCompleted, now)
            .unwrap();
        assert!(!first.unlocked.is_empty());
        let rows = merge_rows(&[], &first.updated);

        let later = now + chrono::Duration::hours(1);
        let second = engine
            .evaluate("u", &catalog, &rows, &c, AchievementTrigger::TaskCompleted, later)
            .unwrap();
        assert!(second.unlocked.is_empty());
        assert!(second.updated.is_empty());
        assert_eq!(merge_rows(&rows, &second.updated), rows);
    }

    #[test]
    fn unlocked_rows_survive_streak_reset() {
        let catalog = default_catalog();
        let engine = AchievementEngine::new();
        let now = Utc::now();
        let first = engine
            .evaluate("u", &catalog, &[], &counters(1, 7), AchievementTrigger::TaskCompleted, now)
            .unwrap();
        let rows = merge_rows(&[], &first.updated);

        let after_reset = engine
            .evaluate("u", &catalog, &rows, &counters(2, 1), AchievementTrigger::TaskCompleted, now)
            .unwrap();
        assert!(after_reset.updated.iter().all(|r| r.achievement_id != "streak_7"));
        let merged = merge_rows(&rows, &after_reset.updated);
        let streak_7 = merged.iter().find(|r| r.achievement_id == "streak_7").unwrap();
        assert!(streak_7.is_unlocked);
        assert_eq!(streak_7.unlocked_at, Some(now));
        // streak_30 progress follows the counter back down
        let streak_30 = merged.iter().find(|r| r.achievement_id == "streak_30").unwrap();
        assert_eq!(streak_30.progress, 1);
    }

    #[test]
    fn task_trigger_skips_social_and_special() {
        let catalog = default_catalog();
        let c = counters(1, 1).with_friends(3);
        let eval = AchievementEngine::new()
            .evaluate("u", &catalog, &[], &c, AchievementTrigger::TaskCompleted, Utc::now())
            .unwrap();
        assert!(eval.updated.iter().all(|r| r.achievement_id != "first_friend"));

        let social = AchievementEngine::new()
            .evaluate("u", &catalog, &[], &c, AchievementTrigger::FriendAdded, Utc::now())
            .unwrap();
        let ids: Vec<&str> = social.unlocked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["first_friend"]);
    }

    #[test]
    fn xp_trigger_only_checks_special_milestones() {
        let catalog = default_catalog();
        let mut c = counters(3, 3);
        c.level = 10;
        c.total_xp = 4_540;
        let eval = AchievementEngine::new()
            .evaluate("u", &catalog, &[], &c, AchievementTrigger::XpGained, Utc::now())
            .unwrap();
        let ids: Vec<&str> = eval.unlocked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["level_10"]);
        let xp = eval.updated.iter().find(|r| r.achievement_id == "xp_10000").unwrap();
        assert_eq!(xp.progress, 4_540);
        assert!(eval.updated.iter().all(|r| r.achievement_id != "first_task"));
    }

    #[test]
    fn unknown_friend_count_leaves_social_rows_alone() {
        let catalog = default_catalog();
        let rows = vec![UserAchievement {
            user_id: "u".into(),
            achievement_id: "five_friends".into(),
            progress: 3,
            is_unlocked: false,
            unlocked_at: None,
        }];
        let eval = AchievementEngine::new()
            .evaluate("u", &catalog, &rows, &counters(1, 1), AchievementTrigger::Full, Utc::now())
            .unwrap();
        assert!(eval
            .updated
            .iter()
            .all(|r| r.achievement_id != "five_friends" && r.achievement_id != "first_friend"));

        let known = AchievementEngine::new()
            .evaluate(
                "u",
                &catalog,
                &rows,
                &counters(1, 1).with_friends(0),
                AchievementTrigger::Full,
                Utc::now(),
            )
            .unwrap();
        let five = known.updated.iter().find(|r| r.achievement_id == "five_friends").unwrap();
        assert_eq!(five.progress, 0);
    }

    #[test]
    fn zero_threshold_catalog_is_rejected() {
        let mut catalog = default_catalog();
        catalog[0].requirement_value = 0;
        assert!(AchievementEngine::new()
            .evaluate("u", &catalog, &[], &counters(1, 1), AchievementTrigger::Full, Utc::now())
            .is_err());
    }
}
