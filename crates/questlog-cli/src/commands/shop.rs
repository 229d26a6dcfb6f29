use chrono::Utc;
use clap::Subcommand;
use questlog_core::{Database, Shop};

use super::{print_json, transact, CliResult, OutcomeReport};

#[derive(Subcommand)]
pub enum ShopAction {
    /// List items for sale
    List,
    /// Buy an item with gold
    Buy {
        /// Item ID (e.g. "xp_boost")
        item: String,
        /// Number of units
        #[arg(long, default_value = "1")]
        quantity: u32,
    },
}

pub fn run(user: &str, action: ShopAction) -> CliResult {
    let shop = Shop::default();

    match action {
        ShopAction::List => print_json(&shop.items())?,
        ShopAction::Buy { item, quantity } => {
            let db = Database::open()?;
            let now = Utc::now();
            let outcome = transact(&db, user, now, |snapshot| {
                shop.purchase(snapshot, &item, quantity, now)
            })?;
            print_json(&OutcomeReport::from(&outcome))?;
        }
    }
    Ok(())
}
