use chrono::Utc;
use clap::Subcommand;
use questlog_core::{Config, Database};

use super::{print_json, transact, CliResult, OutcomeReport};

#[derive(Subcommand)]
pub enum BonusAction {
    /// Claim today's bonus gold
    Claim,
}

pub fn run(user: &str, action: BonusAction) -> CliResult {
    match action {
        BonusAction::Claim => {
            let engine = Config::load()?.engine()?;
            let db = Database::open()?;
            let now = Utc::now();
            let outcome = transact(&db, user, now, |snapshot| engine.claim_daily_bonus(snapshot, now))?;
            print_json(&OutcomeReport::from(&outcome))?;
        }
    }
    Ok(())
}
