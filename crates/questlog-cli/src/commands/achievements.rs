use chrono::Utc;
use clap::Subcommand;
use questlog_core::rewards::AchievementTrigger;
use questlog_core::{Config, Database};
use serde_json::json;

use super::{print_json, transact, CliResult, OutcomeReport};

#[derive(Subcommand)]
pub enum AchievementsAction {
    /// List the catalog with this user's progress
    List,
    /// Record the user's friend count and unlock social achievements
    Friends {
        /// Number of friends added so far
        #[arg(long)]
        count: u64,
    },
    /// Re-check every achievement against stored progress
    Refresh,
}

pub fn run(user: &str, action: AchievementsAction) -> CliResult {
    let engine = Config::load()?.engine()?;
    let db = Database::open()?;

    match action {
        AchievementsAction::List => {
            let rows = db.achievements(user)?;
            let listing: Vec<_> = engine
                .catalog()
                .iter()
                .map(|a| {
                    let row = rows.iter().find(|r| r.achievement_id == a.id);
                    json!({
                        "id": a.id,
                        "name": a.name,
                        "description": a.description,
                        "category": a.category,
                        "rarity": a.rarity,
                        "requirement": a.requirement_value,
                        "progress": row.map_or(0, |r| r.progress),
                        "unlocked": row.is_some_and(|r| r.is_unlocked),
                        "unlocked_at": row.and_then(|r| r.unlocked_at),
                    })
                })
                .collect();
            print_json(&listing)?;
        }
        AchievementsAction::Friends { count } => {
            let now = Utc::now();
            let outcome = transact(&db, user, now, |snapshot| {
                engine.reevaluate_achievements(
                    snapshot,
                    AchievementTrigger::FriendAdded,
                    Some(count),
                    now,
                )
            })?;
            print_json(&OutcomeReport::from(&outcome))?;
        }
        AchievementsAction::Refresh => {
            let now = Utc::now();
            let outcome = transact(&db, user, now, |snapshot| {
                engine.reevaluate_achievements(snapshot, AchievementTrigger::Full, None, now)
            })?;
            print_json(&OutcomeReport::from(&outcome))?;
        }
    }
    Ok(())
}
