use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "questlog-cli", version, about = "Questlog rewards CLI")]
struct Cli {
    /// User whose progress to read and update
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task completion rewards
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// XP, level, gold and streak
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Gold transaction history
    Ledger {
        #[command(subcommand)]
        action: commands::ledger::LedgerAction,
    },
    /// Achievement progress
    Achievements {
        #[command(subcommand)]
        action: commands::achievements::AchievementsAction,
    },
    /// Spend gold on powerups
    Shop {
        #[command(subcommand)]
        action: commands::shop::ShopAction,
    },
    /// Owned and active powerups
    Powerup {
        #[command(subcommand)]
        action: commands::powerup::PowerupAction,
    },
    /// Daily login bonus
    Bonus {
        #[command(subcommand)]
        action: commands::bonus::BonusAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let user = cli.user.as_str();
    let result = match cli.command {
        Commands::Task { action } => commands::task::run(user, action),
        Commands::Progress { action } => commands::progress::run(user, action),
        Commands::Ledger { action } => commands::ledger::run(user, action),
        Commands::Achievements { action } => commands::achievements::run(user, action),
        Commands::Shop { action } => commands::shop::run(user, action),
        Commands::Powerup { action } => commands::powerup::run(user, action),
        Commands::Bonus { action } => commands::bonus::run(user, action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
