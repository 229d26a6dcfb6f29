pub mod achievements;
pub mod bonus;
pub mod config;
pub mod ledger;
pub mod powerup;
pub mod progress;
pub mod shop;
pub mod task;

use chrono::{DateTime, Utc};
use questlog_core::{CoreError, Database, RewardError, RewardOutcome, RewardSnapshot};
use serde::Serialize;

/// Attempts made when another writer commits between our read and write,
/// or holds the database past the busy timeout.
const MAX_ATTEMPTS: u32 = 3;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load a fresh snapshot, run `apply` on it and commit the outcome,
/// starting over when another writer got in the way.
pub fn transact<F>(
    db: &Database,
    user: &str,
    now: DateTime<Utc>,
    mut apply: F,
) -> Result<RewardOutcome, CoreError>
where
    F: FnMut(&RewardSnapshot) -> Result<RewardOutcome, RewardError>,
{
    let mut attempt = 1;
    loop {
        let snapshot = db.load_snapshot(user, now)?;
        let outcome = apply(&snapshot)?;
        match db.commit(&outcome) {
            Ok(()) => return Ok(outcome),
            Err(e) if e.is_contention() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(user, attempt, error = %e, "write contended, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// JSON shape shared by every command that changes rewards.
#[derive(Serialize)]
pub struct OutcomeReport<'a> {
    pub event_id: String,
    pub summary: &'a questlog_core::RewardSummary,
    pub progress: &'a questlog_core::UserProgress,
    pub events: &'a [questlog_core::Event],
}

impl<'a> From<&'a RewardOutcome> for OutcomeReport<'a> {
    fn from(outcome: &'a RewardOutcome) -> Self {
        Self {
            event_id: outcome.event_id.to_string(),
            summary: &outcome.summary,
            progress: &outcome.progress,
            events: &outcome.events,
        }
    }
}
