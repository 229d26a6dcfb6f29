use chrono::Utc;
use clap::Subcommand;
use questlog_core::rewards::StreakTier;
use questlog_core::{Config, Database};
use serde_json::json;

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Show XP, level, gold and streak
    Show,
}

pub fn run(user: &str, action: ProgressAction) -> CliResult {
    match action {
        ProgressAction::Show => {
            let engine = Config::load()?.engine()?;
            let db = Database::open()?;
            let progress = db.load_progress(user)?;
            let curve = engine.levels().curve();
            let (into_level, level_span) = curve.progress_in_level(progress.total_xp);
            let tier = StreakTier::for_streak(progress.current_streak);
            let today = engine.local_date(Utc::now());
            print_json(&json!({
                "progress": progress,
                "xp_into_level": into_level,
                "xp_for_next_level": level_span,
                "next_level_at": curve.xp_for_level(progress.level + 1),
                "streak_tier": tier,
                "streak_multiplier": tier.multiplier().factor(),
                "daily_bonus_available": progress.last_daily_bonus != Some(today),
            }))?;
        }
    }
    Ok(())
}
