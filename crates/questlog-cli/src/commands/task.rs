//! Task completion commands for CLI.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use questlog_core::{Config, Database, TaskCompletion};

use super::{print_json, transact, CliResult, OutcomeReport};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Record a completed task and grant its rewards
    Complete {
        /// Task difficulty, 1 (trivial) to 5 (epic)
        #[arg(long)]
        difficulty: u8,
        /// Identifier of the completed task
        #[arg(long)]
        task_id: Option<String>,
        /// Completion time as RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
    },
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid --at '{raw}': {e}").into())
}

pub fn run(user: &str, action: TaskAction) -> CliResult {
    match action {
        TaskAction::Complete {
            difficulty,
            task_id,
            at,
        } => {
            let engine = Config::load()?.engine()?;
            let db = Database::open()?;
            let now = Utc::now();
            let completion = TaskCompletion {
                task_id,
                difficulty,
                completed_at: at.as_deref().map(parse_time).transpose()?.unwrap_or(now),
            };
            let outcome = transact(&db, user, now, |snapshot| {
                engine.complete_task(snapshot, &completion, now)
            })?;
            print_json(&OutcomeReport::from(&outcome))?;
        }
    }
    Ok(())
}
