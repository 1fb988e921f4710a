//! chunkmerge - merges code-split chunks into one output per entry point
//!
//! Takes the chunks of a multi-entry code-splitting build, assigns each chunk to the
//! most upstream entry that needs it and re-bundles every entry with its chunks.
//!
//! # Features
//! - Global (IIFE) outputs that reach other entries' chunks through their globals
//! - ES module outputs grouped per entry
//! - Source maps carried through the merge

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chunkmerge::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunkmerge=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunkmerge=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
