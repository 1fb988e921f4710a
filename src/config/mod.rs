//! Configuration handling
//!
//! Parses and validates `merge.toml`: the entry modules with their dependencies, the
//! external globals and the output settings.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bundler::ChunkId;
use crate::graph::DirectedGraph;
use crate::utils::{to_unix, MultiMap};

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prefix of every entry's output file name
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub chunk_format: ChunkFormat,

    /// Entry modules by name
    #[serde(default)]
    pub modules: IndexMap<String, ModuleSpec>,

    /// Module specifier -> global variable providing it at runtime
    #[serde(default)]
    pub external: IndexMap<String, String>,

    #[serde(default)]
    pub output: OutputConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

/// An entry module, ready for allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDecl {
    pub name: String,

    /// Output file name: prefix + name + `.js`
    pub id: ChunkId,

    pub dependencies: Vec<ChunkId>,

    /// Source file the entry is compiled from, when declared
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        // Set root directory to the directory containing the config file
        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse(&content, root)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, root: PathBuf) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).with_context(|| "Failed to parse merge.toml")?;
        config.root = root;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            anyhow::bail!("At least one module must be specified in merge.toml");
        }

        if escapes_base(&self.prefix) {
            anyhow::bail!("Prefix '{}' must not escape the base directory", self.prefix);
        }

        for (name, spec) in &self.modules {
            if let Some(entry) = spec.entry() {
                let full_path = self.root.join(entry);
                if !full_path.exists() {
                    anyhow::bail!(
                        "Module '{}' points to non-existent file: {}",
                        name,
                        full_path.display()
                    );
                }
            }
        }

        self.entries().map(|_| ())
    }

    /// Output file name of a module
    pub fn entry_id(&self, name: &str) -> ChunkId {
        ChunkId::new(format!("{}{}.js", self.prefix, name))
    }

    /// Modules in dependency order, roots first
    pub fn entries(&self) -> Result<Vec<EntryDecl>> {
        let mut graph = DirectedGraph::new();

        for name in self.modules.keys() {
            graph.add_node(name.clone());
        }
        for (name, spec) in &self.modules {
            for dependency in spec.dependencies() {
                if !self.modules.contains_key(dependency) {
                    anyhow::bail!("Module '{}' depends on unknown module '{}'", name, dependency);
                }
                graph.add_edge(dependency.clone(), name.clone());
            }
        }

        let sorted = graph.sort().map_err(|err| {
            anyhow::anyhow!("Circular dependency in modules: {}", err.remaining.join(", "))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|name| {
                let spec = self.modules.get(&name)?;
                Some(EntryDecl {
                    id: self.entry_id(&name),
                    dependencies: spec.dependencies().iter().map(|d| self.entry_id(d)).collect(),
                    source: spec.entry().map(|entry| self.root.join(entry)),
                    name,
                })
            })
            .collect())
    }

    /// Entry id -> direct prerequisite entry ids, root-to-leaf
    pub fn entry_dependencies(&self) -> Result<MultiMap<ChunkId, ChunkId>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|entry| (entry.id, entry.dependencies))
            .collect())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }
}

/// Whether a relative path climbs above the directory it is relative to
fn escapes_base(path: &str) -> bool {
    if path.starts_with('/') || Path::new(path).is_absolute() {
        return true;
    }

    let mut depth = 0usize;
    for part in to_unix(path).split('/') {
        match part {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(parent) => depth = parent,
                None => return true,
            },
            _ => depth += 1,
        }
    }
    false
}
