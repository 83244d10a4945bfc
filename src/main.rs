//! PostgreSQL credential connector CLI
//!
//! This is the main entry point for the CLI application.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = cli::Cli::parse();
    let config = cli::load_config(&cli)?;

    // Initialize tracing; the driver's own verbosity comes from the config.
    // An unknown level is reported once the subscriber is installed.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(
            config
                .driver_filter_directive()
                .parse()
                .context("Invalid driver log directive")?,
        );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Execute the command
    cli::execute(cli, config).await
}
