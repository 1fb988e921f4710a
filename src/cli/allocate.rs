//! Allocate command implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::bundler::{BuildOptions, Bundler, ChunkSet};
use crate::config::Config;
use crate::linker::Linker;

/// Print which entry each chunk is merged into
#[derive(Args, Debug)]
pub struct AllocateCommand {
    /// Chunk manifest (JSON) or directory of chunk files
    #[arg(long)]
    pub chunks: PathBuf,
}

impl AllocateCommand {
    pub fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        let chunks = ChunkSet::load(&self.chunks)?;

        let bundler = Bundler::new(config, BuildOptions::default(), Arc::new(Linker::new()));
        let allocation = bundler.allocate(&chunks)?;

        println!("{}", serde_json::to_string_pretty(&allocation.to_map())?);

        Ok(())
    }
}
