use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "waypoint-cli", version, about = "Waypoint CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitored region management
    Region {
        #[command(subcommand)]
        action: commands::region::RegionAction,
    },
    /// Optimization tier control
    Tier {
        #[command(subcommand)]
        action: commands::tier::TierAction,
    },
    /// Geofence event processing and log
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Notification delivery, snooze, and mute
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Retry and expiry sweeps
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// System state overview
    Diagnostics {
        #[command(subcommand)]
        action: commands::diagnostics::DiagnosticsAction,
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
    let result = match cli.command {
        Commands::Region { action } => commands::region::run(action),
        Commands::Tier { action } => commands::tier::run(action),
        Commands::Event { action } => commands::event::run(action),
        Commands::Notify { action } => commands::notify::run(action),
        Commands::Sweep { action } => commands::sweep::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Diagnostics { action } => commands::diagnostics::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
