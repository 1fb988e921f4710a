//! Chunks produced by the host bundler's code-splitting pass

use std::borrow::Borrow;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sourcemap::SourceMap;
use tracing::debug;
use walkdir::WalkDir;

use crate::linker::ModuleAnalysis;
use crate::utils::{is_relative_specifier, join_specifier, strip_js_extension, to_unix};

/// Unique, path-like identifier of a chunk (e.g. `a/chunk-0.js`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without directories and without a trailing `.js`
    pub fn file_stem(&self) -> &str {
        let base = self.0.rsplit(['/', '\\']).next().unwrap_or(&self.0);
        strip_js_extension(base)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ChunkId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChunkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChunkId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A chunk id tagged with whether it is an entry's own chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkRef {
    /// The chunk an entry point compiles to
    Entry(ChunkId),
    /// A chunk shared between entries
    Plain(ChunkId),
}

impl ChunkRef {
    /// Tag `id` by looking it up among the entry ids
    pub fn classify(id: &ChunkId, is_entry: impl Fn(&ChunkId) -> bool) -> Self {
        if is_entry(id) {
            ChunkRef::Entry(id.clone())
        } else {
            ChunkRef::Plain(id.clone())
        }
    }

    pub fn id(&self) -> &ChunkId {
        match self {
            ChunkRef::Entry(id) | ChunkRef::Plain(id) => id,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, ChunkRef::Entry(_))
    }
}

/// A compiled code unit
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,

    /// Display name (defaults to the file stem)
    pub name: String,

    /// Generated code
    pub code: String,

    /// Source map of `code`, if the host bundler produced one
    pub map: Option<SourceMap>,

    /// Exported binding names, in order
    pub exports: Vec<String>,

    /// Chunks (or external specifiers) this chunk imports
    pub imports: Vec<ChunkId>,
}

impl Chunk {
    /// Create a chunk without a source map
    pub fn new(
        id: impl Into<ChunkId>,
        code: impl Into<String>,
        exports: Vec<String>,
        imports: Vec<ChunkId>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.file_stem().to_string(),
            id,
            code: code.into(),
            map: None,
            exports,
            imports,
        }
    }
}

/// One record of a chunk manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub exports: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Inline code; read from `<dir>/<id>` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Inline source map; read from `<dir>/<id>.map` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<serde_json::Value>,
}

/// All chunks of one code-splitting pass, in the order the host bundler emitted them
#[derive(Debug, Clone, Default)]
pub struct ChunkSet {
    chunks: IndexMap<ChunkId, Chunk>,
}

impl ChunkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk, replacing any chunk with the same id
    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    /// Code-unit provider: the chunk with the given id
    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.chunks.values()
    }

    /// Chunk adjacency: chunk id -> imported ids
    pub fn import_map(&self) -> IndexMap<ChunkId, Vec<ChunkId>> {
        self.chunks
            .iter()
            .map(|(id, chunk)| (id.clone(), chunk.imports.clone()))
            .collect()
    }

    /// Total number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Load chunks from a manifest file or from a directory of `.js` files
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_manifest_file(path)
        }
    }

    /// Read a JSON manifest; missing code and maps are read next to the manifest
    pub fn from_manifest_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read chunk manifest: {}", path.display()))?;
        let records: IndexMap<String, ChunkRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse chunk manifest: {}", path.display()))?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_records(records, base_dir)
    }

    /// Build a chunk set from manifest records
    pub fn from_records(records: IndexMap<String, ChunkRecord>, base_dir: &Path) -> Result<Self> {
        let mut set = Self::new();

        for (id, record) in records {
            let code = match record.code {
                Some(code) => code,
                None => {
                    let code_path = base_dir.join(&id);
                    fs::read_to_string(&code_path).with_context(|| {
                        format!("Failed to read chunk code: {}", code_path.display())
                    })?
                }
            };

            let map = match record.map {
                Some(value) => Some(parse_source_map(&serde_json::to_vec(&value)?, &id)?),
                None => read_source_map(&base_dir.join(format!("{}.map", id)), &id)?,
            };

            let mut chunk = Chunk::new(
                id.as_str(),
                code,
                record.exports,
                record.imports.into_iter().map(ChunkId::from).collect(),
            );
            if let Some(name) = record.name {
                chunk.name = name;
            }
            chunk.map = map;
            set.insert(chunk);
        }

        Ok(set)
    }

    /// Scan a directory of chunk files, recovering imports and exports from their code
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut set = Self::new();

        let mut paths: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().map(|ext| ext == "js").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            let relative = path.strip_prefix(dir).unwrap_or(&path);
            let id = to_unix(&relative.display().to_string());

            let code = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read chunk: {}", path.display()))?;
            let analysis = ModuleAnalysis::parse(&id, &code)?;

            let imports = analysis
                .requests
                .iter()
                .map(|specifier| {
                    if is_relative_specifier(specifier) {
                        ChunkId::new(join_specifier(&id, specifier))
                    } else {
                        ChunkId::new(specifier.as_str())
                    }
                })
                .collect();
            let exports = analysis
                .exports
                .iter()
                .map(|export| export.exported.clone())
                .collect();

            let mut map_path = path.clone().into_os_string();
            map_path.push(".map");
            let map = read_source_map(Path::new(&map_path), &id)?;

            debug!("Found chunk {}", id);

            let mut chunk = Chunk::new(id.as_str(), code, exports, imports);
            chunk.map = map;
            set.insert(chunk);
        }

        Ok(set)
    }
}

fn read_source_map(path: &Path, id: &str) -> Result<Option<SourceMap>> {
    if !path.is_file() {
        return Ok(None);
    }

    let data = fs::read(path)
        .with_context(|| format!("Failed to read source map: {}", path.display()))?;
    parse_source_map(&data, id).map(Some)
}

fn parse_source_map(data: &[u8], id: &str) -> Result<SourceMap> {
    SourceMap::from_slice(data).with_context(|| format!("Invalid source map for chunk {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chunk_id_file_stem() {
        assert_eq!(ChunkId::new("d/another-entry.js").file_stem(), "another-entry");
        assert_eq!(ChunkId::new("entry.js").file_stem(), "entry");
        assert_eq!(ChunkId::new("external").file_stem(), "external");
    }

    #[test]
    fn test_chunk_ref_classification() {
        let entries = [ChunkId::new("a.js")];
        let is_entry = |id: &ChunkId| entries.contains(id);

        assert!(ChunkRef::classify(&ChunkId::new("a.js"), is_entry).is_entry());
        let plain = ChunkRef::classify(&ChunkId::new("ab.js"), is_entry);
        assert!(!plain.is_entry());
        assert_eq!(plain.id().as_str(), "ab.js");
    }

    #[test]
    fn test_from_records_with_inline_code() {
        let records: IndexMap<String, ChunkRecord> = serde_json::from_str(
            r#"{
                "entry.js": {"imports": ["chunk.js"], "exports": ["a"], "code": "export const a = 1;"},
                "chunk.js": {"exports": ["b"], "name": "shared", "code": "export const b = 2;"}
            }"#,
        )
        .unwrap();

        let set = ChunkSet::from_records(records, Path::new(".")).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("entry.js").unwrap().name, "entry");
        assert_eq!(set.get("chunk.js").unwrap().name, "shared");
        let imports = set.import_map();
        assert_eq!(imports["entry.js"], vec![ChunkId::new("chunk.js")]);
        assert!(imports["chunk.js"].is_empty());
    }

    #[test]
    fn test_from_manifest_reads_code_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("entry.js"), "export const a = 1;").unwrap();
        fs::write(
            dir.path().join("chunks.json"),
            r#"{"entry.js": {"exports": ["a"]}}"#,
        )
        .unwrap();

        let set = ChunkSet::load(&dir.path().join("chunks.json")).unwrap();

        assert_eq!(set.get("entry.js").unwrap().code, "export const a = 1;");
        assert!(set.get("entry.js").unwrap().map.is_none());
    }

    #[test]
    fn test_from_dir_recovers_graph() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(
            dir.path().join("entry.js"),
            "import { x } from './a/chunk-0.js';\nexport const y = x;\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a/chunk-0.js"),
            "import * as R from 'react';\nconst x = R;\nexport { x };\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = ChunkSet::from_dir(dir.path()).unwrap();

        assert_eq!(set.len(), 2);
        let entry = set.get("entry.js").unwrap();
        assert_eq!(entry.imports, vec![ChunkId::new("a/chunk-0.js")]);
        assert_eq!(entry.exports, vec!["y".to_string()]);
        let chunk = set.get("a/chunk-0.js").unwrap();
        assert_eq!(chunk.imports, vec![ChunkId::new("react")]);
        assert_eq!(chunk.exports, vec!["x".to_string()]);
    }
}
