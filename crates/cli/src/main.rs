use crate::{
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
    simulate::SimulationParams,
};
use clap::Parser;
use commands::Commands;
use engine_config::ImporterSettings;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;
mod simulate;

#[derive(Parser)]
#[command(name = "cdc", version = "0.1.0", about = "CDC import and acknowledgment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    // Initialize logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match execute(cli.command, &shutdown).await {
        Ok(()) if shutdown.is_shutdown_requested() => ExitCode::ShutdownRequested,
        Ok(()) => ExitCode::Success,
        Err(err) => {
            error!(error = %err, "Command failed");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

async fn execute(command: Commands, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    match command {
        Commands::Check { config } => {
            let settings = ImporterSettings::load(&config).await?;
            output::print_report(&settings)?;
        }
        Commands::Simulate {
            config,
            channels,
            changes,
            ack_latency_ms,
            output,
        } => {
            let settings = ImporterSettings::load(&config).await?;
            let params = SimulationParams {
                channels,
                changes,
                ack_latency: Duration::from_millis(ack_latency_ms),
            };

            let report = simulate::run(settings, params, shutdown.cancel_token()).await?;
            info!(state = %report.state, elapsed_ms = report.elapsed_ms, "Simulation complete");

            match output {
                Some(path) => output::write_report(&report, &path).await?,
                None => output::print_report(&report)?,
            }
        }
    }

    Ok(())
}
