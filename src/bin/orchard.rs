//! Orchard CLI Binary
//!
//! Command-line interface for orchard collection trees.

use anyhow::Context;
use clap::Parser;
use orchard::logging::init_logging;
use orchard::tooling::cli::{load_config, Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli).context("Failed to load configuration")?;
    init_logging(Some(&cli.logging_config(&config.logging)))
        .context("Failed to initialize logging")?;

    let context = CliContext::new(cli.workspace.clone(), config, cli.store.clone())
        .context("Error initializing workspace")?;

    let output = context.execute(&cli.command)?;
    println!("{}", output);
    Ok(())
}
