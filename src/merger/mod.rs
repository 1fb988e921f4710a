//! Chunk merging
//!
//! Given an allocation, re-bundles the chunks of each entry into one artifact. Chunks
//! owned by another entry stay out of the bundle and are reached at runtime through the
//! owner's global: `<entry namespace>.<chunk namespace>`.

mod facade;
mod loader;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::allocator::ChunkAllocation;
use crate::bundler::{ChunkId, ChunkSet};
use crate::error::MergeError;
use crate::host::{BundleRequest, HostBundler, LoadResult, OutputChunk, OutputFormat};
use crate::utils::{
    clean_path, file_namespace, is_relative_specifier, join_specifier, strip_js_extension, to_unix,
};

pub use facade::{assign_namespaces, facade_code, FACADE_ID};
use loader::{EntryLoader, SplitLoader};

/// Read-only lookup tables shared by every merge of one build
pub(crate) struct MergerState {
    allocation: ChunkAllocation,
    chunks: Arc<ChunkSet>,

    /// Module specifier -> runtime global
    externals: IndexMap<String, String>,

    /// Entry -> identifier its merged output is assigned to
    entry_namespaces: IndexMap<ChunkId, String>,

    /// Entry -> (allocated chunk -> namespace token inside that entry)
    chunk_namespaces: HashMap<ChunkId, IndexMap<ChunkId, String>>,

    /// Chunk -> entry it is allocated to
    owners: HashMap<ChunkId, ChunkId>,

    /// Normalized chunk path -> chunk id
    paths: HashMap<String, ChunkId>,
}

impl MergerState {
    fn owner(&self, id: &str) -> Option<&ChunkId> {
        self.owners.get(id)
    }

    /// Map a specifier back to a chunk id, resolving relative paths against `importer`
    fn find_chunk(&self, specifier: &str, importer: Option<&str>) -> Option<&ChunkId> {
        let path = match importer {
            Some(importer) if is_relative_specifier(specifier) => {
                join_specifier(importer, specifier)
            }
            _ => clean_path(&to_unix(specifier)),
        };
        self.paths.get(&path)
    }

    /// Global expression that evaluates to `chunk`'s namespace inside `owner`'s output
    fn global_of(&self, owner: &ChunkId, chunk: &ChunkId) -> String {
        let namespace = self
            .entry_namespaces
            .get(owner)
            .cloned()
            .unwrap_or_else(|| file_namespace(owner.as_str()));

        if owner == chunk {
            return namespace;
        }

        match self
            .chunk_namespaces
            .get(owner)
            .and_then(|namespaces| namespaces.get(chunk))
        {
            Some(token) => format!("{}.{}", namespace, token),
            None => namespace,
        }
    }

    fn load_chunk(&self, id: &str) -> Result<LoadResult, MergeError> {
        let chunk = self
            .chunks
            .get(id)
            .ok_or_else(|| MergeError::MissingChunk(ChunkId::new(id)))?;
        Ok(LoadResult::new(chunk.code.as_str()).with_map(chunk.map.clone()))
    }
}

/// Merges allocated chunks into entry outputs
#[derive(Clone)]
pub struct ChunkMerger {
    state: Arc<MergerState>,
    host: Arc<dyn HostBundler>,
}

impl ChunkMerger {
    /// Build the lookup tables; every allocated chunk must be present in `chunks`
    pub fn new(
        allocation: ChunkAllocation,
        chunks: Arc<ChunkSet>,
        externals: IndexMap<String, String>,
        host: Arc<dyn HostBundler>,
    ) -> Result<Self, MergeError> {
        let mut entry_namespaces = IndexMap::new();
        let mut chunk_namespaces = HashMap::new();
        let mut owners = HashMap::new();
        let mut paths = HashMap::new();

        for entry in allocation.keys() {
            let entry_chunk = chunks
                .get(entry.as_str())
                .ok_or_else(|| MergeError::MissingChunk(entry.clone()))?;

            entry_namespaces.insert(entry.clone(), file_namespace(entry.as_str()));

            let allocated = allocation.values(entry).filter(|chunk| *chunk != entry);
            chunk_namespaces.insert(
                entry.clone(),
                assign_namespaces(allocated, &entry_chunk.exports),
            );
        }

        for (entry, chunk) in allocation.iter() {
            if !chunks.contains(chunk.as_str()) {
                return Err(MergeError::MissingChunk(chunk.clone()));
            }
            owners.insert(chunk.clone(), entry.clone());
            paths.insert(clean_path(&to_unix(chunk.as_str())), chunk.clone());
        }

        Ok(Self {
            state: Arc::new(MergerState {
                allocation,
                chunks,
                externals,
                entry_namespaces,
                chunk_namespaces,
                owners,
                paths,
            }),
            host,
        })
    }

    /// Entries in allocation order
    pub fn entries(&self) -> impl Iterator<Item = &ChunkId> + '_ {
        self.state.allocation.keys()
    }

    /// Global identifier an entry's merged output is assigned to
    pub fn entry_namespace(&self, entry: &ChunkId) -> Option<&str> {
        self.state.entry_namespaces.get(entry).map(String::as_str)
    }

    /// Namespace tokens of the chunks allocated to an entry
    pub fn chunk_namespaces(&self, entry: &ChunkId) -> Option<&IndexMap<ChunkId, String>> {
        self.state.chunk_namespaces.get(entry)
    }

    /// Merge one entry and its allocated chunks into a single IIFE output
    pub async fn merge_entry(&self, entry: &ChunkId) -> Result<OutputChunk, MergeError> {
        let state = &*self.state;
        let namespaces = state
            .chunk_namespaces
            .get(entry)
            .ok_or_else(|| MergeError::MissingChunk(entry.clone()))?;
        let entry_chunk = state
            .chunks
            .get(entry.as_str())
            .ok_or_else(|| MergeError::MissingChunk(entry.clone()))?;

        let loader = EntryLoader {
            state,
            entry,
            facade: facade_code(entry, namespaces),
        };
        let request = BundleRequest::new(OutputFormat::Iife {
            name: state.global_of(entry, entry),
        })
        .input(strip_js_extension(entry.as_str()), FACADE_ID);

        debug!(
            "Merging {} with {} allocated chunks using {}",
            entry,
            namespaces.len(),
            self.host.name()
        );

        let mut outputs = self.host.bundle(request, &loader).await?;
        if outputs.len() != 1 {
            return Err(MergeError::OutputCount {
                entry: entry.clone(),
                count: outputs.len(),
            });
        }

        let mut output = outputs.remove(0);
        output.file_name = entry.to_string();
        output.name = entry_chunk.name.clone();
        output.facade_module_id = None;
        output.modules.retain(|id| id != FACADE_ID);

        Ok(output)
    }

    /// Re-bundle every entry at once as ES modules, grouping chunks by owner
    pub async fn merge_split(&self, format: &OutputFormat) -> Result<Vec<OutputChunk>, MergeError> {
        if !matches!(format, OutputFormat::Es) {
            return Err(MergeError::UnsupportedFormat(format.label()));
        }

        let state = &*self.state;
        let mut request = BundleRequest::new(format.clone());
        for entry in state.allocation.keys() {
            request = request.input(strip_js_extension(entry.as_str()), entry.as_str());
        }
        for (entry, chunk) in state.allocation.iter() {
            request.manual_chunks.insert(
                chunk.to_string(),
                strip_js_extension(entry.as_str()).to_string(),
            );
        }

        debug!(
            "Merging {} entries as ES modules using {}",
            state.allocation.len(),
            self.host.name()
        );

        self.host.bundle(request, &SplitLoader { state }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::compute_chunk_allocation;
    use crate::bundler::Chunk;
    use crate::linker::Linker;
    use crate::utils::MultiMap;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, code: &str, exports: &[&str], imports: &[&str]) -> Chunk {
        Chunk::new(
            id,
            code,
            exports.iter().map(|e| e.to_string()).collect(),
            imports.iter().map(|i| ChunkId::new(*i)).collect(),
        )
    }

    fn merger(
        chunks: Vec<Chunk>,
        entries: &[(&str, &[&str])],
        externals: &[(&str, &str)],
    ) -> ChunkMerger {
        let mut set = ChunkSet::new();
        for chunk in chunks {
            set.insert(chunk);
        }
        let entry_deps: MultiMap<ChunkId, ChunkId> = entries
            .iter()
            .map(|(entry, deps)| (ChunkId::new(*entry), deps.iter().map(|d| ChunkId::new(*d)).collect()))
            .collect();
        let allocation = compute_chunk_allocation(&set.import_map(), &entry_deps).unwrap();
        let externals = externals
            .iter()
            .map(|(id, global)| (id.to_string(), global.to_string()))
            .collect();

        ChunkMerger::new(allocation, Arc::new(set), externals, Arc::new(Linker::new())).unwrap()
    }

    fn two_entries() -> ChunkMerger {
        merger(
            vec![
                chunk("chunk-1.js", "export const shared = 1;\n", &["shared"], &[]),
                chunk(
                    "entry.js",
                    "import { shared } from './chunk-1.js';\nexport const a = shared;\n",
                    &["a"],
                    &["chunk-1.js"],
                ),
                chunk(
                    "d/another-entry.js",
                    "import { shared } from '../chunk-1.js';\nimport { a } from '../entry.js';\nexport const b = shared + a;\n",
                    &["b"],
                    &["chunk-1.js", "entry.js"],
                ),
            ],
            &[("entry.js", &[]), ("d/another-entry.js", &["entry.js"])],
            &[],
        )
    }

    #[tokio::test]
    async fn test_namespaces_avoid_entry_exports() {
        let merger = merger(
            vec![
                chunk("chunk-1.js", "export const c1 = 1;\n", &["c1"], &[]),
                chunk("chunk-2.js", "export const c2 = 2;\n", &["c2"], &[]),
                chunk(
                    "entry.js",
                    "import { c1 } from './chunk-1.js';\nimport { c2 } from './chunk-2.js';\nexport const $0 = c1;\nexport const a = c2;\nexport const b = 3;\n",
                    &["$0", "a", "b"],
                    &["chunk-1.js", "chunk-2.js"],
                ),
            ],
            &[("entry.js", &[])],
            &[],
        );

        let output = merger.merge_entry(&ChunkId::new("entry.js")).await.unwrap();

        assert_eq!(output.exports, vec!["$0", "$1", "$2", "a", "b"]);
        assert_eq!(output.file_name, "entry.js");
        assert_eq!(output.name, "entry");
        assert_eq!(output.facade_module_id, None);
        assert_eq!(output.modules, vec!["chunk-1.js", "chunk-2.js", "entry.js"]);
        assert!(output.code.starts_with("var entry = (function (exports) {"));
    }

    #[tokio::test]
    async fn test_foreign_chunks_are_referenced_through_owner_global() {
        let merger = two_entries();
        let entry = ChunkId::new("entry.js");
        let another = ChunkId::new("d/another-entry.js");

        assert_eq!(merger.entry_namespace(&another), Some("another_entry"));
        assert_eq!(merger.chunk_namespaces(&entry).unwrap()[&ChunkId::new("chunk-1.js")], "$0");
        assert!(merger.chunk_namespaces(&another).unwrap().is_empty());

        let first = merger.merge_entry(&entry).await.unwrap();
        assert_eq!(first.exports, vec!["$0", "a"]);
        assert_eq!(first.modules, vec!["chunk-1.js", "entry.js"]);

        let second = merger.merge_entry(&another).await.unwrap();
        assert_eq!(second.file_name, "d/another-entry.js");
        assert_eq!(second.exports, vec!["b"]);
        assert_eq!(second.modules, vec!["d/another-entry.js"]);
        assert_eq!(second.imports, vec!["chunk-1.js", "entry.js"]);
        assert!(second.code.starts_with("var another_entry = (function (exports, __x0, __x1) {"));
        assert!(second.code.contains("const b = __x0.shared + __x1.a;"));
        assert!(!second.code.contains("var shared"));
        assert!(second.code.ends_with("})({}, entry.$0, entry);\n"));
    }

    #[tokio::test]
    async fn test_external_globals_are_substituted() {
        let merger = merger(
            vec![chunk(
                "entry.js",
                "import ext from 'external';\nexport const a = ext;\nexport default a;\n",
                &["a", "default"],
                &["external"],
            )],
            &[("entry.js", &[])],
            &[("external", "External")],
        );

        let output = merger.merge_entry(&ChunkId::new("entry.js")).await.unwrap();

        assert_eq!(output.imports, vec!["external"]);
        assert!(output.code.contains("var ext = __interopDefault(__x0);"));
        assert!(output.code.contains("var __default_export = a;"));
        assert!(output.code.ends_with("})({}, External);\n"));
        assert_eq!(output.modules, vec!["entry.js"]);

        let dir = tempfile::tempdir().unwrap();
        let script = format!("var External = 41;\n{}\nconsole.log(entry.a);\n", output.code);
        if let Some(stdout) = crate::linker::tests::run_node(dir.path(), &script) {
            assert_eq!(stdout, "41");
        }
    }

    #[tokio::test]
    async fn test_merged_entries_share_live_state() {
        let merger = merger(
            vec![
                chunk(
                    "chunk-1.js",
                    "export let count = 0;\nexport function inc() { count++; }\n",
                    &["count", "inc"],
                    &[],
                ),
                chunk(
                    "entry.js",
                    "import { inc } from './chunk-1.js';\nexport function start() { inc(); }\n",
                    &["start"],
                    &["chunk-1.js"],
                ),
                chunk(
                    "d/another-entry.js",
                    "import { count } from '../chunk-1.js';\nimport { start } from '../entry.js';\nexport function read() { start(); return count; }\n",
                    &["read"],
                    &["chunk-1.js", "entry.js"],
                ),
            ],
            &[("entry.js", &[]), ("d/another-entry.js", &["entry.js"])],
            &[],
        );

        let first = merger.merge_entry(&ChunkId::new("entry.js")).await.unwrap();
        let second = merger.merge_entry(&ChunkId::new("d/another-entry.js")).await.unwrap();

        assert!(second.code.contains("function read() { (0, __x1.start)(); return __x0.count; }"));
        assert!(second.code.ends_with("})({}, entry.$0, entry);\n"));

        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "{}{}\nconsole.log(another_entry.read(), another_entry.read());\n",
            first.code, second.code
        );
        if let Some(stdout) = crate::linker::tests::run_node(dir.path(), &script) {
            assert_eq!(stdout, "1 2");
        }
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let merger = two_entries();
        let entry = ChunkId::new("d/another-entry.js");

        let first = merger.merge_entry(&entry).await.unwrap();
        let second = merger.merge_entry(&entry).await.unwrap();

        assert_eq!(first.code, second.code);
    }

    #[tokio::test]
    async fn test_unknown_import_is_unexpected() {
        let merger = merger(
            vec![chunk(
                "entry.js",
                "import { x } from './missing.js';\nexport const a = x;\n",
                &["a"],
                &[],
            )],
            &[("entry.js", &[])],
            &[],
        );

        let err = merger.merge_entry(&ChunkId::new("entry.js")).await.unwrap_err();
        match err {
            MergeError::UnexpectedModule { id, importer } => {
                assert_eq!(id, "./missing.js");
                assert_eq!(importer.as_deref(), Some("entry.js"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_split_merge_groups_chunks_by_owner() {
        let merger = two_entries();

        let outputs = merger.merge_split(&OutputFormat::Es).await.unwrap();
        let files: Vec<&str> = outputs.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(files, vec!["entry.js", "d/another-entry.js"]);

        assert_eq!(outputs[0].modules, vec!["chunk-1.js", "entry.js"]);
        assert_eq!(outputs[1].modules, vec!["d/another-entry.js"]);
        assert!(outputs[1].code.starts_with("import { __m0, __m1 } from '../entry.js';\n"));
    }

    #[tokio::test]
    async fn test_split_merge_rejects_iife() {
        let merger = two_entries();
        let err = merger
            .merge_split(&OutputFormat::Iife {
                name: "bundle".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::UnsupportedFormat("iife")));
    }

    struct SplittingHost;

    #[async_trait]
    impl HostBundler for SplittingHost {
        fn name(&self) -> &str {
            "splitting"
        }

        async fn bundle(
            &self,
            request: BundleRequest,
            loader: &dyn crate::host::ModuleLoader,
        ) -> Result<Vec<OutputChunk>, MergeError> {
            let outputs = Linker::new().bundle(request, loader).await?;
            Ok(outputs.iter().chain(outputs.iter()).cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_more_than_one_output_is_an_error() {
        let mut set = ChunkSet::new();
        set.insert(chunk("entry.js", "export const a = 1;\n", &["a"], &[]));
        let allocation: ChunkAllocation =
            vec![(ChunkId::new("entry.js"), vec![ChunkId::new("entry.js")])]
                .into_iter()
                .collect();
        let merger = ChunkMerger::new(
            allocation,
            Arc::new(set),
            IndexMap::new(),
            Arc::new(SplittingHost),
        )
        .unwrap();

        let err = merger.merge_entry(&ChunkId::new("entry.js")).await.unwrap_err();
        assert!(matches!(err, MergeError::OutputCount { count: 2, .. }));
    }

    #[test]
    fn test_missing_allocated_chunk_is_rejected() {
        let allocation: ChunkAllocation =
            vec![(ChunkId::new("entry.js"), vec![ChunkId::new("entry.js")])]
                .into_iter()
                .collect();

        let result = ChunkMerger::new(
            allocation,
            Arc::new(ChunkSet::new()),
            IndexMap::new(),
            Arc::new(Linker::new()),
        );
        assert!(matches!(result, Err(MergeError::MissingChunk(_))));
    }
}
