use clap::{Parser, Subcommand};
use habitflow_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "habitflow", version, about = "Habitflow CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Record a completion
    Complete(commands::complete::CompleteArgs),
    /// Show a habit's streak record
    Streak {
        /// Habit ID
        id: String,
    },
    /// List habits that are due
    Due(commands::due::DueArgs),
    /// Reset expired streaks once
    Sweep,
    /// Streak statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the expiration sweep periodically until interrupted
    Daemon(commands::daemon::DaemonArgs),
}

fn init_tracing() {
    // An unreadable config is reported by the command itself
    let filter = Config::load()
        .map(|c| c.logging.filter)
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Complete(args) => commands::complete::run(args),
        Commands::Streak { id } => commands::streak::run(&id),
        Commands::Due(args) => commands::due::run(args),
        Commands::Sweep => commands::sweep::run(),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Daemon(args) => commands::daemon::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
