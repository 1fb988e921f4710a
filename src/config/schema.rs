//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// How merged entries are emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChunkFormat {
    /// One self-executing script per entry, exported through a global
    #[default]
    Global,
    /// ES modules with code splitting
    Module,
}

/// Where source maps go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    None,
    /// `<file>.map` next to each output
    #[default]
    File,
    /// Base64 data URL appended to each output
    Inline,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    #[serde(default)]
    pub sourcemap: SourceMapMode,

    /// Write `manifest.json` with content hashes
    #[serde(default = "default_true")]
    pub manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            sourcemap: SourceMapMode::default(),
            manifest: true,
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_true() -> bool {
    true
}

/// One entry of the `[modules]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleSpec {
    /// `name = "src/name.js"`
    Entry(String),
    Detailed(ModuleConfig),
}

impl ModuleSpec {
    /// Source file the entry is compiled from, if declared
    pub fn entry(&self) -> Option<&str> {
        match self {
            ModuleSpec::Entry(entry) => Some(entry),
            ModuleSpec::Detailed(config) => config.entry.as_deref(),
        }
    }

    /// Names of the modules this one depends on
    pub fn dependencies(&self) -> &[String] {
        match self {
            ModuleSpec::Entry(_) => &[],
            ModuleSpec::Detailed(config) => &config.dependencies,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,
}
