//! Built-in host bundler
//!
//! A small ES module linker: discovers modules through a [`ModuleLoader`], wraps each
//! one in a function scope that returns its namespace object, and concatenates them in
//! execution order into an IIFE script or a set of ES module files. Imported bindings
//! are read through the exporting namespace at every use, so they stay live.

mod output;
mod parse;
mod render;
mod scan;

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use indexmap::IndexMap;
use sourcemap::SourceMap;
use tracing::debug;

use crate::error::MergeError;
use crate::host::{BundleRequest, HostBundler, ModuleLoader, OutputChunk, OutputFormat, ResolveResult};

pub use parse::{ExportBinding, ExportSource, ImportBinding, Imported, ModuleAnalysis};

/// The linker
#[derive(Debug, Clone, Default)]
pub struct Linker;

impl Linker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostBundler for Linker {
    fn name(&self) -> &str {
        "linker"
    }

    async fn bundle(
        &self,
        request: BundleRequest,
        loader: &dyn ModuleLoader,
    ) -> Result<Vec<OutputChunk>, MergeError> {
        let graph = ModuleGraph::discover(&request, loader)?;

        debug!(
            "Linked {} modules and {} externals for {} inputs (loader: {})",
            graph.modules.len(),
            graph.externals.len(),
            graph.inputs.len(),
            loader.name()
        );

        match &request.format {
            OutputFormat::Iife { name } => {
                if graph.inputs.len() != 1 {
                    return Err(MergeError::UnsupportedFormat(request.format.label()));
                }
                Ok(vec![graph.render_iife(name)?])
            }
            OutputFormat::Es => graph.render_es(&request.manual_chunks),
        }
    }
}

/// What a specifier inside a module resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Index into `ModuleGraph::modules`
    Module(usize),
    /// Index into `ModuleGraph::externals`
    External(usize),
}

/// A loaded and analysed module
#[derive(Debug)]
struct LinkedModule {
    id: String,
    /// Code as loaded, used as source contents when there is no input map
    code: String,
    map: Option<SourceMap>,
    analysis: ModuleAnalysis,
    targets: HashMap<String, Target>,
}

/// Every module reachable from the inputs of one request
#[derive(Debug, Default)]
struct ModuleGraph {
    modules: Vec<LinkedModule>,
    index: HashMap<String, usize>,

    /// Execution order: dependencies before dependents
    order: Vec<usize>,

    /// External id -> runtime global, in first-seen order
    externals: IndexMap<String, Option<String>>,

    /// `(name, module)` per input
    inputs: Vec<(String, usize)>,
}

impl ModuleGraph {
    fn discover(request: &BundleRequest, loader: &dyn ModuleLoader) -> Result<Self, MergeError> {
        let mut graph = ModuleGraph::default();

        for (name, specifier) in &request.inputs {
            let id = match loader.resolve_id(specifier, None)? {
                ResolveResult::Resolved(id) => id,
                ResolveResult::External { id, .. } => {
                    return Err(MergeError::Bundler(format!(
                        "input `{}` resolved to external module `{}`",
                        name, id
                    )))
                }
            };
            let module = graph.visit(id, loader)?;
            graph.inputs.push((name.clone(), module));
        }

        Ok(graph)
    }

    /// Load `id` and its dependencies depth-first, recording post-order
    fn visit(&mut self, id: String, loader: &dyn ModuleLoader) -> Result<usize, MergeError> {
        if let Some(&module) = self.index.get(&id) {
            return Ok(module);
        }

        let loaded = loader.load(&id)?;
        let analysis = ModuleAnalysis::parse(&id, &loaded.code)?;
        let requests = analysis.requests.clone();

        let slot = self.modules.len();
        self.index.insert(id.clone(), slot);
        self.modules.push(LinkedModule {
            id: id.clone(),
            code: loaded.code,
            map: loaded.map,
            analysis,
            targets: HashMap::new(),
        });

        for specifier in requests {
            let target = match loader.resolve_id(&specifier, Some(&id))? {
                ResolveResult::Resolved(resolved) => Target::Module(self.visit(resolved, loader)?),
                ResolveResult::External { id: external, global } => {
                    let entry = self.externals.entry(external);
                    let index = entry.index();
                    entry.or_insert(global);
                    Target::External(index)
                }
            };
            self.modules[slot].targets.insert(specifier, target);
        }

        self.order.push(slot);
        Ok(slot)
    }

    fn target(&self, module: usize, specifier: &str) -> Result<Target, MergeError> {
        self.modules[module]
            .targets
            .get(specifier)
            .copied()
            .ok_or_else(|| {
                MergeError::Bundler(format!(
                    "`{}` in `{}` was never resolved",
                    specifier, self.modules[module].id
                ))
            })
    }

    /// Statically known export names of a module, `export *` from bundled modules
    /// included
    fn export_names(&self, module: usize) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut visited = HashSet::new();
        self.collect_export_names(module, true, &mut names, &mut visited);
        names
    }

    fn collect_export_names(
        &self,
        module: usize,
        with_default: bool,
        names: &mut BTreeSet<String>,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(module) {
            return;
        }

        let linked = &self.modules[module];
        names.extend(
            linked
                .analysis
                .exported_names()
                .filter(|name| with_default || *name != "default")
                .map(str::to_string),
        );

        for specifier in &linked.analysis.star_exports {
            if let Some(Target::Module(source)) = linked.targets.get(specifier) {
                self.collect_export_names(*source, false, names, visited);
            }
        }
    }
}

/// Guess a global name for an external without a configured one
fn guess_global(id: &str) -> String {
    let stem = id.rsplit('/').next().unwrap_or(id);
    crate::utils::file_namespace(stem)
}
