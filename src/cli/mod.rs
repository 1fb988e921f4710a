//! Command-line interface for chunkmerge
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `allocate`: Show which entry each chunk is merged into
//! - `merge`: Merge chunks into one output per entry and write them

mod allocate;
mod merge;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use allocate::AllocateCommand;
pub use merge::MergeCommand;

/// chunkmerge - merges code-split chunks into one output per entry point
#[derive(Parser, Debug)]
#[command(name = "chunkmerge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to merge.toml config file
    #[arg(short, long, global = true, default_value = "merge.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the chunk allocation as JSON
    Allocate(AllocateCommand),

    /// Merge chunks and write the outputs
    Merge(MergeCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Allocate(cmd) => cmd.execute(&self.config),
            Commands::Merge(cmd) => {
                print_banner();
                cmd.execute(&self.config).await
            }
        }
    }
}

/// Print the chunkmerge banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "chunkmerge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
