//! Marquee API Server - Entry Point

use log::{error, info};
use marquee_api::Server;
use marquee_api::config::AppConfig;
use marquee_api::utils::logging::setup_logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    info!("Launching Marquee API server...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match Server::bind(config).await {
        Ok(server) => server.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
