//! Cache test backend - controllable HTTP responses for cache testing

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use cache_test_backend::{
    backend::Server,
    cli::{Cli, Command},
    config::Config,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            cli.apply_overrides(&mut config);
            match config.validated() {
                Ok(config) => config,
                Err(e) => {
                    error!("Invalid configuration: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Config) => print_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Print the effective configuration
fn print_config(config: &Config) -> ExitCode {
    match config.to_yaml() {
        Ok(yaml) => {
            print!("{yaml}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the backend server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        delay_capacity = config.delay.capacity,
        "Starting cache test backend"
    );

    if let Err(e) = Server::new(config).run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
