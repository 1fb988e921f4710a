//! IIFE and ES rendering of a linked module graph

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use indexmap::IndexMap;
use tracing::warn;

use super::parse::{ExportSource, Imported};
use super::render::{quote, Emitter, RUNTIME_HELPERS};
use super::scan::rewrite_references;
use super::{guess_global, ModuleGraph, Target};
use crate::error::MergeError;
use crate::host::OutputChunk;
use crate::utils::relative_specifier;

impl ModuleGraph {
    /// Render the single input as a script assigning its exports to `var <name>`
    pub(super) fn render_iife(&self, name: &str) -> Result<OutputChunk, MergeError> {
        let (input_name, input) = &self.inputs[0];
        let file_name = format!("{}.js", input_name);
        let mut emitter = Emitter::new(&file_name);

        let mut params = vec!["exports".to_string()];
        let mut globals = vec!["{}".to_string()];
        for (index, (id, global)) in self.externals.iter().enumerate() {
            params.push(external_ref(index));
            globals.push(match global {
                Some(global) => global.clone(),
                None => {
                    let guess = guess_global(id);
                    warn!(
                        "No global name for external module `{}`, guessing `{}`",
                        id, guess
                    );
                    guess
                }
            });
        }

        emitter.line(&format!("var {} = (function ({}) {{", name, params.join(", ")));
        emitter.line("'use strict';");
        emitter.line(RUNTIME_HELPERS);

        for &module in &self.order {
            self.render_module(module, true, &mut emitter)?;
        }

        let exports = self.export_names(*input);
        emitter.line("Object.defineProperty(exports, '__esModule', { value: true });");
        for export in &exports {
            emitter.line(&format!(
                "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {}.{}; }} }});",
                quote(export),
                module_ref(*input),
                export
            ));
        }
        emitter.line("return exports;");
        emitter.line(&format!("}})({});", globals.join(", ")));

        let (code, map) = emitter.finish();

        Ok(OutputChunk {
            file_name,
            name: input_name.clone(),
            code,
            map: Some(map),
            exports: exports.into_iter().collect(),
            imports: self.externals.keys().cloned().collect(),
            modules: self.order.iter().map(|&m| self.modules[m].id.clone()).collect(),
            facade_module_id: Some(self.modules[*input].id.clone()),
            is_entry: true,
        })
    }

    /// Render one ES module file per input and per manual chunk group
    ///
    /// A module goes to its manual group, else to the input it is, else to the first
    /// input that reaches it.
    pub(super) fn render_es(
        &self,
        manual_chunks: &IndexMap<String, String>,
    ) -> Result<Vec<OutputChunk>, MergeError> {
        let reached_by = self.first_reaching_input();

        let mut groups: IndexMap<String, Vec<usize>> = self
            .inputs
            .iter()
            .map(|(name, _)| (name.clone(), Vec::new()))
            .collect();
        let mut group_of = vec![0; self.modules.len()];

        for &module in &self.order {
            let id = &self.modules[module].id;
            let input = self.inputs.iter().find(|(_, m)| *m == module);
            let group = match (input, manual_chunks.get(id)) {
                (Some((name, _)), _) => name.clone(),
                (None, Some(group)) => group.clone(),
                (None, None) => self.inputs[reached_by[module]].0.clone(),
            };
            let entry = groups.entry(group);
            group_of[module] = entry.index();
            entry.or_default().push(module);
        }

        // Namespaces each group must export for the others
        let mut shared: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); groups.len()];
        for &module in &self.order {
            for target in self.modules[module].targets.values() {
                if let Target::Module(dependency) = *target {
                    if group_of[dependency] != group_of[module] {
                        shared[group_of[dependency]].insert(dependency);
                    }
                }
            }
        }

        let mut outputs = Vec::with_capacity(groups.len());
        for (index, (group, modules)) in groups.iter().enumerate() {
            let file_name = format!("{}.js", group);
            let dir = Path::new(&file_name).parent().unwrap_or(Path::new(""));
            let mut emitter = Emitter::new(&file_name);

            let mut externals: BTreeSet<usize> = BTreeSet::new();
            let mut imported: IndexMap<usize, BTreeSet<usize>> = IndexMap::new();
            for &module in modules {
                for target in self.modules[module].targets.values() {
                    match *target {
                        Target::External(external) => {
                            externals.insert(external);
                        }
                        Target::Module(dependency) if group_of[dependency] != index => {
                            imported.entry(group_of[dependency]).or_default().insert(dependency);
                        }
                        Target::Module(_) => {}
                    }
                }
            }
            imported.sort_keys();

            let mut imports = Vec::new();
            for &external in &externals {
                let (id, _) = self.externals.get_index(external).ok_or_else(|| {
                    MergeError::Bundler(format!("unknown external #{}", external))
                })?;
                emitter.line(&format!("import * as {} from {};", external_ref(external), quote(id)));
                imports.push(id.clone());
            }
            for (other, namespaces) in &imported {
                let (other_group, _) = groups.get_index(*other).ok_or_else(|| {
                    MergeError::Bundler(format!("unknown output group #{}", other))
                })?;
                let other_file = format!("{}.js", other_group);
                let names: Vec<String> = namespaces.iter().map(|&m| module_ref(m)).collect();
                emitter.line(&format!(
                    "import {{ {} }} from {};",
                    names.join(", "),
                    quote(&relative_specifier(dir, Path::new(&other_file)))
                ));
                imports.push(other_file);
            }

            let input = self.inputs.iter().find(|(name, _)| name == group).map(|(_, m)| *m);
            let mut specifiers = Vec::new();
            let mut exports = Vec::new();

            emitter.line(RUNTIME_HELPERS);
            for &module in modules {
                if Some(module) != input {
                    self.render_module(module, false, &mut emitter)?;
                    continue;
                }
                for (local, export) in self.render_top_level(module, &mut emitter)? {
                    specifiers.push(if local == export {
                        export.clone()
                    } else {
                        format!("{} as {}", local, export)
                    });
                    exports.push(export);
                }
            }
            for &module in &shared[index] {
                specifiers.push(module_ref(module));
                exports.push(module_ref(module));
            }
            if !specifiers.is_empty() {
                emitter.line(&format!("export {{ {} }};", specifiers.join(", ")));
            }
            exports.sort();

            let (code, map) = emitter.finish();
            outputs.push(OutputChunk {
                file_name,
                name: group.clone(),
                code,
                map: Some(map),
                exports,
                imports,
                modules: modules.iter().map(|&m| self.modules[m].id.clone()).collect(),
                facade_module_id: input.map(|m| self.modules[m].id.clone()),
                is_entry: input.is_some(),
            });
        }

        Ok(outputs)
    }

    /// Wrap one module in a function scope returning its namespace
    ///
    /// `interop` reads default imports of externals through `__interopDefault`, as IIFE
    /// globals may be plain values rather than namespaces.
    fn render_module(
        &self,
        module: usize,
        interop: bool,
        emitter: &mut Emitter,
    ) -> Result<(), MergeError> {
        let prepared = self.prepare(module, interop)?;
        emitter.line(&format!("var {} = (function () {{", module_ref(module)));
        self.emit_body(module, &prepared, emitter);
        emitter.line(&format!("return {};", self.namespace(module, interop, &prepared.references)?));
        emitter.line("})();");
        Ok(())
    }

    /// Emit an ES input's code at file scope so its own exports stay live bindings
    ///
    /// Returns `(local, exported)` pairs. Exports without a binding of their own (re-exports
    /// and imported bindings) are read from the namespace once the module has run.
    fn render_top_level(
        &self,
        module: usize,
        emitter: &mut Emitter,
    ) -> Result<Vec<(String, String)>, MergeError> {
        let prepared = self.prepare(module, false)?;
        self.emit_body(module, &prepared, emitter);
        emitter.line(&format!(
            "var {} = {};",
            module_ref(module),
            self.namespace(module, false, &prepared.references)?
        ));

        let exports = &self.modules[module].analysis.exports;
        let mut pairs = Vec::new();
        for (n, export) in self.export_names(module).into_iter().enumerate() {
            let own = exports.iter().find_map(|binding| match &binding.source {
                ExportSource::Local(local)
                    if binding.exported == export && !prepared.references.contains_key(local) =>
                {
                    Some(local.clone())
                }
                _ => None,
            });
            let local = match own {
                Some(local) => local,
                None => {
                    let local = format!("__e{}", n);
                    emitter.line(&format!("var {} = {}.{};", local, module_ref(module), export));
                    local
                }
            };
            pairs.push((local, export));
        }
        Ok(pairs)
    }

    /// Resolve a module's imports: namespaces and interop defaults become `var`
    /// declarations, every other import is read through its source at each use
    fn prepare(&self, module: usize, interop: bool) -> Result<Prepared, MergeError> {
        let linked = &self.modules[module];
        let mut declarations = Vec::new();
        let mut references = HashMap::new();

        for binding in &linked.analysis.imports {
            let target = self.target(module, &binding.source)?;
            match &binding.imported {
                Imported::Namespace => {
                    declarations.push(format!("var {} = {};", binding.local, reference(target)))
                }
                Imported::Named(name) if is_interop_default(target, name, interop) => {
                    declarations.push(format!(
                        "var {} = {};",
                        binding.local,
                        member(target, name, interop)
                    ))
                }
                Imported::Named(name) => {
                    references.insert(binding.local.clone(), member(target, name, interop));
                }
            }
        }

        let body = rewrite_references(&linked.analysis.body, &references).map_err(|message| {
            MergeError::Syntax {
                id: linked.id.clone(),
                message,
            }
        })?;

        Ok(Prepared {
            declarations,
            body,
            references,
        })
    }

    fn emit_body(&self, module: usize, prepared: &Prepared, emitter: &mut Emitter) {
        let linked = &self.modules[module];
        for declaration in &prepared.declarations {
            emitter.line(declaration);
        }
        emitter.mapped_body(&linked.id, &prepared.body, &linked.code, linked.map.as_ref());
    }

    /// `__ns(...)` expression building a module's namespace object
    fn namespace(
        &self,
        module: usize,
        interop: bool,
        references: &HashMap<String, String>,
    ) -> Result<String, MergeError> {
        let linked = &self.modules[module];

        let mut getters = Vec::new();
        for export in &linked.analysis.exports {
            let value = match &export.source {
                ExportSource::Local(local) => {
                    references.get(local).cloned().unwrap_or_else(|| local.clone())
                }
                ExportSource::Reexport {
                    specifier,
                    imported,
                } => member(self.target(module, specifier)?, imported, interop),
                ExportSource::Namespace { specifier } => reference(self.target(module, specifier)?),
            };
            getters.push(format!("{}: function () {{ return {}; }}", export.exported, value));
        }
        let stars = linked
            .analysis
            .star_exports
            .iter()
            .map(|specifier| self.target(module, specifier).map(reference))
            .collect::<Result<Vec<_>, _>>()?;

        let getters = if getters.is_empty() {
            String::new()
        } else {
            format!(" {} ", getters.join(", "))
        };
        Ok(format!("__ns({{{}}}, [{}])", getters, stars.join(", ")))
    }

    /// Input index that first reaches each module, following inputs in request order
    fn first_reaching_input(&self) -> Vec<usize> {
        let mut reached_by: Vec<Option<usize>> = vec![None; self.modules.len()];

        for (input_index, (_, input)) in self.inputs.iter().enumerate() {
            let mut stack = vec![*input];
            while let Some(module) = stack.pop() {
                if reached_by[module].is_some() {
                    continue;
                }
                reached_by[module] = Some(input_index);
                stack.extend(self.modules[module].targets.values().filter_map(|target| {
                    match target {
                        Target::Module(dependency) => Some(*dependency),
                        Target::External(_) => None,
                    }
                }));
            }
        }

        reached_by.into_iter().map(Option::unwrap_or_default).collect()
    }
}

/// A module's code with its import references resolved
struct Prepared {
    declarations: Vec<String>,
    body: String,
    /// Local name -> expression reading the imported binding
    references: HashMap<String, String>,
}

fn module_ref(module: usize) -> String {
    format!("__m{}", module)
}

fn external_ref(external: usize) -> String {
    format!("__x{}", external)
}

fn reference(target: Target) -> String {
    match target {
        Target::Module(module) => module_ref(module),
        Target::External(external) => external_ref(external),
    }
}

fn is_interop_default(target: Target, name: &str, interop: bool) -> bool {
    interop && name == "default" && matches!(target, Target::External(_))
}

fn member(target: Target, name: &str, interop: bool) -> String {
    match target {
        Target::External(external) if is_interop_default(target, name, interop) => {
            format!("__interopDefault({})", external_ref(external))
        }
        target => format!("{}.{}", reference(target), name),
    }
}
