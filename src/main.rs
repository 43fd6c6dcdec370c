//! Emberserve - a development web server with live reload.

mod cli;
mod config;
mod embed;
mod error;
mod logger;
mod registry;
mod reload;
mod server;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::Cli;
use config::ServerConfig;
use registry::ServerRegistry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = ServerConfig::resolve(&cli)?;
    serve(config)
}

fn serve(config: ServerConfig) -> Result<()> {
    let registry = Arc::new(ServerRegistry::new());
    let server = registry.create_or_fetch("default", config)?;

    // Ctrl+C tears down every registered server, which unblocks run().
    let shutdown = Arc::clone(&registry);
    ctrlc::set_handler(move || shutdown.teardown_all())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    server.run()
}
