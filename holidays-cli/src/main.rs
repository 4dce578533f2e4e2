//! Holidays — public holiday cache and daily notifier.
//!
//! # Usage
//!
//! ```text
//! holidays sync [--json]
//! holidays list [--country XX] [--order date|date-desc|country] [--json]
//! holidays today [--date YYYY-MM-DD] [--json]
//! holidays show <name> [--json]
//! holidays status [--json]
//! holidays config show|countries|notifications|api-key|notify-at|year|notify-command
//! holidays daemon start|stop|status|sync|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, list::ListArgs, show::ShowArgs,
    status::StatusArgs, sync::SyncArgs, today::TodayArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "holidays",
    version,
    about = "Fetch, cache and announce public holidays",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch holidays for the selected countries and replace the cache.
    Sync(SyncArgs),

    /// List cached holidays.
    List(ListArgs),

    /// Show holidays celebrated today and send notifications for them.
    Today(TodayArgs),

    /// Look up one cached holiday by name.
    Show(ShowArgs),

    /// Show cache freshness and settings.
    Status(StatusArgs),

    /// Read or change settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run and talk to the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::List(args) => args.run(),
        Commands::Today(args) => args.run(),
        Commands::Show(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
