//! Netgraft CLI
//!
//! Command-line interface for transfer-learning surgery.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::debug;

use netgraft::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    debug!("Netgraft v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Inspect { model } => {
            commands::inspect(&model).with_context(|| format!("failed to inspect {}", model.display()))
        }
        Commands::Apply {
            model,
            plan,
            output,
            seed,
        } => commands::apply(&model, &plan, &output, seed)
            .map(|_| ())
            .with_context(|| format!("failed to apply {} to {}", plan.display(), model.display())),
        Commands::ImportLrn { config, input_width } => commands::import_lrn(&config, input_width)
            .map(|_| ())
            .with_context(|| format!("failed to import {}", config.display())),
    }
}
