//! Merge command implementation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::bundler::{BuildOptions, Bundler, ChunkSet};
use crate::config::{ChunkFormat, Config, SourceMapMode};
use crate::linker::Linker;
use crate::utils::{format_duration, format_size};

/// Merge chunks into one output per entry
#[derive(Args, Debug)]
pub struct MergeCommand {
    /// Chunk manifest (JSON) or directory of chunk files
    #[arg(long)]
    pub chunks: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Output format, overriding `chunk_format`
    #[arg(long, value_enum)]
    pub format: Option<ChunkFormat>,

    /// Source map output, overriding `output.sourcemap`
    #[arg(long, value_enum)]
    pub sourcemap: Option<SourceMapMode>,
}

impl MergeCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        let chunks = ChunkSet::load(&self.chunks)?;

        eprintln!(
            "{} Merging {} chunks into {} entries...",
            "→".blue(),
            chunks.len(),
            config.modules.len()
        );

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("merging");
        spinner.enable_steady_tick(Duration::from_millis(80));

        let bundler = Bundler::new(config, self.into(), Arc::new(Linker::new()));
        let result = bundler.build(chunks).await;
        spinner.finish_and_clear();

        let result = result?;
        let bundles = bundler.write(&result)?;

        eprintln!(
            "\n{} Merged {} output(s) in {}\n",
            "✓".green().bold(),
            bundles.len(),
            format_duration(start.elapsed())
        );

        // Print output summary
        for bundle in &bundles {
            eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                bundle.output_path.display().to_string().cyan(),
                format_size(bundle.size).dimmed()
            );
        }

        eprintln!();

        Ok(())
    }
}

impl From<&MergeCommand> for BuildOptions {
    fn from(cmd: &MergeCommand) -> Self {
        Self {
            outdir: cmd.outdir.clone(),
            format: cmd.format,
            sourcemap: cmd.sourcemap,
        }
    }
}
