use clap::Subcommand;
use questlog_core::rewards::verify_chain;
use questlog_core::Database;
use serde_json::json;

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// List gold transactions, oldest first
    List {
        /// Only show the most recent N entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Replay the ledger and check it against the stored balance
    Verify,
}

pub fn run(user: &str, action: LedgerAction) -> CliResult {
    let db = Database::open()?;

    match action {
        LedgerAction::List { limit } => {
            let entries = db.transactions(user)?;
            let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
            print_json(&entries[skip..])?;
        }
        LedgerAction::Verify => {
            let entries = db.transactions(user)?;
            let progress = db.load_progress(user)?;
            let replayed = verify_chain(&entries).map_err(|b| {
                format!(
                    "ledger chain broken at entry {} ({}): expected balance {}, recorded {}",
                    b.index, b.transaction_id, b.expected_balance, b.recorded_balance
                )
            })?;
            if replayed != progress.gold_balance {
                return Err(format!(
                    "ledger replays to {replayed} but stored balance is {}",
                    progress.gold_balance
                )
                .into());
            }
            print_json(&json!({
                "ok": true,
                "entries": entries.len(),
                "balance": replayed,
            }))?;
        }
    }
    Ok(())
}
