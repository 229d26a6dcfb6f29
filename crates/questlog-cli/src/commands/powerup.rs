use chrono::Utc;
use clap::Subcommand;
use questlog_core::{Database, Shop};
use serde_json::json;

use super::{print_json, transact, CliResult, OutcomeReport};

#[derive(Subcommand)]
pub enum PowerupAction {
    /// Show active powerups and unused inventory
    List,
    /// Activate one owned item
    Activate {
        /// Item ID (e.g. "streak_freeze")
        item: String,
    },
    /// Delete expired powerups from storage
    Purge,
}

pub fn run(user: &str, action: PowerupAction) -> CliResult {
    let db = Database::open()?;
    let now = Utc::now();

    match action {
        PowerupAction::List => {
            print_json(&json!({
                "active": db.active_powerups(user, now)?,
                "inventory": db.inventory(user)?,
            }))?;
        }
        PowerupAction::Activate { item } => {
            let shop = Shop::default();
            let outcome = transact(&db, user, now, |snapshot| shop.activate(snapshot, &item, now))?;
            print_json(&OutcomeReport::from(&outcome))?;
        }
        PowerupAction::Purge => {
            let removed = db.purge_expired_powerups(now)?;
            print_json(&json!({ "removed": removed }))?;
        }
    }
    Ok(())
}
