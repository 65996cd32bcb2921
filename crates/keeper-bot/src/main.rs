//! PerpsV2 keeper entry point.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

mod app;
mod config;
mod error;

use app::Application;
use config::Config;

/// Off-chain keeper for PerpsV2 markets: executes delayed orders and
/// liquidates underwater positions.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the keeper until shutdown.
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Run = cli.command;

    // Exit code 1: fatal startup error (bad config, unreachable RPC).
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = keeper_telemetry::init_logging(&config.log_level) {
        eprintln!("logging error: {e}");
        return ExitCode::from(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        network = config.network.label(),
        "Starting perps keeper"
    );

    let application = match Application::bootstrap(config).await {
        Ok(application) => application,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::from(1);
        }
    };

    // Exit code 2: unrecoverable runtime error.
    match application.run().await {
        Ok(()) => {
            info!("Clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Keeper stopped with an unrecoverable error");
            ExitCode::from(2)
        }
    }
}
