//! Host bundler interface
//!
//! Merging re-invokes a code-splitting bundler over a handful of synthetic inputs. The
//! bundler sees modules only through a [`ModuleLoader`], so each merge mode plugs its
//! own resolution rules in without the bundler knowing about allocations.

use async_trait::async_trait;
use indexmap::IndexMap;
use sourcemap::SourceMap;

use crate::error::MergeError;

/// Result of a resolve hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// Bundle the module with this id
    Resolved(String),
    /// Mark as external (don't bundle)
    External {
        id: String,
        /// Runtime global that provides the module in IIFE output
        global: Option<String>,
    },
}

impl ResolveResult {
    pub fn external(id: impl Into<String>, global: Option<String>) -> Self {
        ResolveResult::External {
            id: id.into(),
            global,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ResolveResult::Resolved(id) => id,
            ResolveResult::External { id, .. } => id,
        }
    }
}

/// Result of a load hook
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub code: String,
    /// Optional source map of `code`
    pub map: Option<SourceMap>,
}

impl LoadResult {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }

    pub fn with_map(mut self, map: Option<SourceMap>) -> Self {
        self.map = map;
        self
    }
}

/// Resolves and loads the modules of one bundle invocation
pub trait ModuleLoader: Send + Sync {
    /// Loader name for logging and debugging
    fn name(&self) -> &str;

    /// Resolve an import specifier; `importer` is `None` for inputs
    fn resolve_id(&self, specifier: &str, importer: Option<&str>)
        -> Result<ResolveResult, MergeError>;

    /// Load the code of a resolved id
    fn load(&self, id: &str) -> Result<LoadResult, MergeError>;
}

/// Output format of a bundle invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// One self-executing script assigning its exports to `name`
    Iife { name: String },
    /// ES modules, one file per input or manual chunk group
    Es,
}

impl OutputFormat {
    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Iife { .. } => "iife",
            OutputFormat::Es => "es",
        }
    }
}

/// What to bundle and how
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// `(name, specifier)` pairs; each is resolved with no importer
    pub inputs: Vec<(String, String)>,
    pub format: OutputFormat,
    /// Resolved module id -> group name. Groups named after an input share its file.
    pub manual_chunks: IndexMap<String, String>,
}

impl BundleRequest {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            inputs: Vec::new(),
            format,
            manual_chunks: IndexMap::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, specifier: impl Into<String>) -> Self {
        self.inputs.push((name.into(), specifier.into()));
        self
    }
}

/// One file produced by a bundle invocation
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub file_name: String,
    /// Display name, usually the input name
    pub name: String,
    pub code: String,
    pub map: Option<SourceMap>,
    /// Exported names, sorted
    pub exports: Vec<String>,
    /// Files and externals this output imports
    pub imports: Vec<String>,
    /// Module ids bundled into this output, in execution order
    pub modules: Vec<String>,
    /// Input module this output was generated for
    pub facade_module_id: Option<String>,
    pub is_entry: bool,
}

/// A code-splitting bundler that can be re-invoked during merging
#[async_trait]
pub trait HostBundler: Send + Sync {
    fn name(&self) -> &str;

    async fn bundle(
        &self,
        request: BundleRequest,
        loader: &dyn ModuleLoader,
    ) -> Result<Vec<OutputChunk>, MergeError>;
}
