//! CLI Module
//!
//! Command-line interface for Netgraft.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Netgraft - transfer-learning surgery on saved networks
#[derive(Parser, Debug)]
#[command(name = "netgraft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a model's layers, parameter layout and checksum
    #[command(name = "inspect")]
    Inspect {
        /// Path to the model file
        model: PathBuf,
    },

    /// Apply a transfer plan to a model
    #[command(name = "apply")]
    Apply {
        /// Path to the base model file
        model: PathBuf,

        /// Path to the plan file
        #[arg(short, long)]
        plan: PathBuf,

        /// Where to write the new model
        #[arg(short, long)]
        output: PathBuf,

        /// Seed for fresh values (overrides the plan file)
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Map a Keras LRN layer config to a layer spec
    #[command(name = "import-lrn")]
    ImportLrn {
        /// Path to the layer config JSON
        config: PathBuf,

        /// Feature width of the layer input
        #[arg(long)]
        input_width: usize,
    },
}
