//! Build orchestration
//!
//! Allocates the chunks of a code-splitting pass to the configured entries, merges them
//! through the host bundler and writes the results.

mod chunk;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::try_join_all;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::allocator::{compute_chunk_allocation, ChunkAllocation};
use crate::config::{ChunkFormat, Config, SourceMapMode};
use crate::host::{HostBundler, OutputChunk, OutputFormat};
use crate::merger::ChunkMerger;
use crate::utils::hash_content;

pub use chunk::*;

/// Overrides of the configuration for one build
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Output directory
    pub outdir: Option<PathBuf>,

    pub format: Option<ChunkFormat>,

    pub sourcemap: Option<SourceMapMode>,
}

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// Merged outputs, one per entry in global mode
    pub outputs: Vec<OutputChunk>,

    /// Entry -> chunks merged into it
    pub allocation: ChunkAllocation,
}

/// Information about a written output
#[derive(Debug)]
pub struct BundleInfo {
    /// Output file path
    pub output_path: PathBuf,

    /// Output size in bytes
    pub size: usize,

    /// Source map path (if written to a separate file)
    pub sourcemap_path: Option<PathBuf>,
}

/// The main bundler
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Build options
    options: BuildOptions,

    /// Bundler re-invoked for every merge
    host: Arc<dyn HostBundler>,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Config, options: BuildOptions, host: Arc<dyn HostBundler>) -> Self {
        Self {
            config: Arc::new(config),
            options,
            host,
        }
    }

    pub fn format(&self) -> ChunkFormat {
        self.options.format.unwrap_or(self.config.chunk_format)
    }

    pub fn sourcemap(&self) -> SourceMapMode {
        self.options.sourcemap.unwrap_or(self.config.output.sourcemap)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.options
            .outdir
            .clone()
            .unwrap_or_else(|| self.config.output_dir())
    }

    /// Assign every chunk to the entry whose output will carry it
    pub fn allocate(&self, chunks: &ChunkSet) -> Result<ChunkAllocation> {
        for entry in self.config.entries()? {
            if chunks.contains(entry.id.as_str()) {
                continue;
            }
            match &entry.source {
                Some(source) => anyhow::bail!(
                    "No chunk {} for module '{}' (compiled from {})",
                    entry.id,
                    entry.name,
                    source.display()
                ),
                None => anyhow::bail!("No chunk {} for module '{}'", entry.id, entry.name),
            }
        }

        let entry_deps = self.config.entry_dependencies()?;
        let allocation = compute_chunk_allocation(&chunks.import_map(), &entry_deps)
            .context("Failed to allocate chunks")?;

        for (entry, allocated) in allocation.to_map() {
            debug!(
                "{} <- [{}]",
                entry,
                allocated.iter().map(ChunkId::as_str).collect::<Vec<_>>().join(", ")
            );
        }

        Ok(allocation)
    }

    /// Build the project
    pub async fn build(&self, chunks: ChunkSet) -> Result<BuildResult> {
        let start = Instant::now();

        // 1. Allocate chunks to entries
        info!(
            "Allocating {} chunks to {} entries...",
            chunks.len(),
            self.config.modules.len()
        );
        let allocation = self.allocate(&chunks)?;

        // 2. A single entry already is its own output
        if self.config.modules.len() == 1 {
            info!("Single module, chunks are left unmerged");
            let outputs = chunks
                .iter()
                .map(|chunk| passthrough(chunk, allocation.contains_key(&chunk.id)))
                .collect();
            return Ok(BuildResult {
                outputs,
                allocation,
            });
        }

        // 3. Merge
        let merger = ChunkMerger::new(
            allocation.clone(),
            Arc::new(chunks),
            self.config.external.clone(),
            self.host.clone(),
        )?;

        let outputs = match self.format() {
            ChunkFormat::Global => {
                info!("Merging entries as global scripts...");
                let handles: Vec<_> = merger
                    .entries()
                    .cloned()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|entry| {
                        let merger = merger.clone();
                        tokio::spawn(async move { merger.merge_entry(&entry).await })
                    })
                    .collect();

                try_join_all(handles)
                    .await
                    .context("Merge task panicked")?
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()?
            }
            ChunkFormat::Module => {
                info!("Merging entries as ES modules...");
                merger.merge_split(&OutputFormat::Es).await?
            }
        };

        debug!("Build completed in {:?}", start.elapsed());

        Ok(BuildResult {
            outputs,
            allocation,
        })
    }

    /// Write outputs, their source maps and the manifest
    pub fn write(&self, result: &BuildResult) -> Result<Vec<BundleInfo>> {
        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        let mut bundles = Vec::new();
        let mut manifest = IndexMap::new();

        for output in &result.outputs {
            let output_path = output_dir.join(&output.file_name);
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            let mut code = output.code.clone();
            let mut sourcemap_path = None;

            if let Some(map) = &output.map {
                match self.sourcemap() {
                    SourceMapMode::None => {}
                    SourceMapMode::File => {
                        let map_path = PathBuf::from(format!("{}.map", output_path.display()));
                        let mut json = Vec::new();
                        map.to_writer(&mut json)
                            .with_context(|| format!("Failed to serialize source map of {}", output.file_name))?;
                        fs::write(&map_path, json).with_context(|| {
                            format!("Failed to write source map: {}", map_path.display())
                        })?;

                        let map_name = map_path
                            .file_name()
                            .map(|name| name.to_string_lossy().to_string())
                            .unwrap_or_default();
                        append_mapping_url(&mut code, &map_name);
                        sourcemap_path = Some(map_path);
                    }
                    SourceMapMode::Inline => {
                        let mut json = Vec::new();
                        map.to_writer(&mut json)
                            .with_context(|| format!("Failed to serialize source map of {}", output.file_name))?;
                        let url = format!(
                            "data:application/json;charset=utf-8;base64,{}",
                            STANDARD.encode(json)
                        );
                        append_mapping_url(&mut code, &url);
                    }
                }
            }

            fs::write(&output_path, &code)
                .with_context(|| format!("Failed to write output: {}", output_path.display()))?;

            manifest.insert(output.file_name.clone(), hash_content(code.as_bytes()));
            bundles.push(BundleInfo {
                output_path,
                size: code.len(),
                sourcemap_path,
            });
        }

        // Write manifest file if enabled
        if self.config.output.manifest {
            let manifest_path = output_dir.join("manifest.json");
            let manifest_json = serde_json::to_string_pretty(&manifest)?;
            fs::write(&manifest_path, manifest_json).context("Failed to write manifest.json")?;
        }

        Ok(bundles)
    }
}

/// An unmerged chunk as an output
fn passthrough(chunk: &Chunk, is_entry: bool) -> OutputChunk {
    OutputChunk {
        file_name: chunk.id.to_string(),
        name: chunk.name.clone(),
        code: chunk.code.clone(),
        map: chunk.map.clone(),
        exports: chunk.exports.clone(),
        imports: chunk.imports.iter().map(ChunkId::to_string).collect(),
        modules: vec![chunk.id.to_string()],
        facade_module_id: is_entry.then(|| chunk.id.to_string()),
        is_entry,
    }
}

fn append_mapping_url(code: &mut String, url: &str) {
    if !code.ends_with('\n') {
        code.push('\n');
    }
    code.push_str(&format!("//# sourceMappingURL={}\n", url));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::Linker;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const TWO_ENTRIES: &str = r#"
        [modules.a]
        [modules.b]
        dependencies = ["a"]
    "#;

    fn chunk(id: &str, code: &str, exports: &[&str], imports: &[&str]) -> Chunk {
        Chunk::new(
            id,
            code,
            exports.iter().map(|e| e.to_string()).collect(),
            imports.iter().map(|i| ChunkId::new(*i)).collect(),
        )
    }

    fn chunks() -> ChunkSet {
        let mut set = ChunkSet::new();
        set.insert(chunk("shared.js", "export const one = 1;\n", &["one"], &[]));
        set.insert(chunk(
            "a.js",
            "import { one } from './shared.js';\nexport const a = one;\n",
            &["a"],
            &["shared.js"],
        ));
        set.insert(chunk(
            "b.js",
            "import { one } from './shared.js';\nexport const b = one + 1;\n",
            &["b"],
            &["shared.js"],
        ));
        set
    }

    fn bundler(dir: &Path, config: &str, options: BuildOptions) -> Bundler {
        let config = Config::parse(config, dir.to_path_buf()).unwrap();
        Bundler::new(config, options, Arc::new(Linker::new()))
    }

    #[tokio::test]
    async fn test_global_build_merges_each_entry() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(dir.path(), TWO_ENTRIES, BuildOptions::default());
        let result = bundler.build(chunks()).await.unwrap();

        assert_eq!(
            result.allocation.get(&ChunkId::new("a.js")),
            vec![&ChunkId::new("shared.js"), &ChunkId::new("a.js")]
        );

        let files: Vec<&str> = result.outputs.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(files, vec!["a.js", "b.js"]);
        assert_eq!(result.outputs[0].exports, vec!["$0", "a"]);
        assert!(result.outputs[1].code.ends_with("})({}, a.$0);\n"));
    }

    #[tokio::test]
    async fn test_module_build_splits_by_owner() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(
            dir.path(),
            TWO_ENTRIES,
            BuildOptions {
                format: Some(ChunkFormat::Module),
                ..Default::default()
            },
        );
        let result = bundler.build(chunks()).await.unwrap();

        let files: Vec<&str> = result.outputs.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(files, vec!["a.js", "b.js"]);
        assert_eq!(result.outputs[0].modules, vec!["shared.js", "a.js"]);
    }

    #[tokio::test]
    async fn test_single_module_passes_chunks_through() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(dir.path(), "[modules.a]\n", BuildOptions::default());
        let mut set = ChunkSet::new();
        set.insert(chunk("shared.js", "export const one = 1;\n", &["one"], &[]));
        set.insert(chunk(
            "a.js",
            "import { one } from './shared.js';\nexport const a = one;\n",
            &["a"],
            &["shared.js"],
        ));

        let result = bundler.build(set).await.unwrap();

        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.outputs[1].code, "import { one } from './shared.js';\nexport const a = one;\n");
        assert!(result.outputs[1].is_entry);
        assert!(!result.outputs[0].is_entry);
    }

    #[tokio::test]
    async fn test_write_outputs_maps_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(dir.path(), TWO_ENTRIES, BuildOptions::default());
        let result = bundler.build(chunks()).await.unwrap();
        let bundles = bundler.write(&result).unwrap();

        let out = dir.path().join("dist");
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].sourcemap_path, Some(out.join("a.js.map")));

        let code = fs::read_to_string(out.join("a.js")).unwrap();
        assert!(code.ends_with("//# sourceMappingURL=a.js.map\n"));
        assert!(out.join("a.js.map").exists());

        let manifest: IndexMap<String, String> =
            serde_json::from_str(&fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["a.js", "b.js"]);
        assert_eq!(manifest["a.js"], hash_content(code.as_bytes()));
    }

    #[tokio::test]
    async fn test_inline_source_maps() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(
            dir.path(),
            TWO_ENTRIES,
            BuildOptions {
                sourcemap: Some(SourceMapMode::Inline),
                outdir: Some(dir.path().join("inline")),
                ..Default::default()
            },
        );

        let result = bundler.build(chunks()).await.unwrap();
        let bundles = bundler.write(&result).unwrap();

        assert_eq!(bundles[0].sourcemap_path, None);
        let code = fs::read_to_string(dir.path().join("inline/b.js")).unwrap();
        assert!(code.contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,"));
        assert!(!dir.path().join("inline/b.js.map").exists());
    }

    #[tokio::test]
    async fn test_missing_entry_chunk_names_its_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/c.js"), "").unwrap();
        let bundler = bundler(
            dir.path(),
            "[modules.a]\n[modules.c]\nentry = \"src/c.js\"\n",
            BuildOptions::default(),
        );

        let err = bundler.build(chunks()).await.unwrap_err().to_string();
        assert!(err.contains("No chunk c.js for module 'c'"), "{}", err);
        assert!(err.contains("src/c.js"), "{}", err);
    }

    #[tokio::test]
    async fn test_allocation_errors_fail_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(dir.path(), "[modules.a]\n[modules.b]\n", BuildOptions::default());

        let err = bundler.build(chunks()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to allocate chunks"));
    }
}
