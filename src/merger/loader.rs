//! Module loaders used while re-bundling allocated chunks

use tracing::trace;

use super::facade::FACADE_ID;
use super::MergerState;
use crate::bundler::ChunkId;
use crate::error::MergeError;
use crate::host::{LoadResult, ModuleLoader, ResolveResult};

/// Loader of a global-mode merge: bundles one entry's chunks, everything else is a
/// global reference into the output of the entry that owns it
pub(crate) struct EntryLoader<'a> {
    pub(crate) state: &'a MergerState,
    pub(crate) entry: &'a ChunkId,
    pub(crate) facade: String,
}

impl ModuleLoader for EntryLoader<'_> {
    fn name(&self) -> &str {
        "merge-entry"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> Result<ResolveResult, MergeError> {
        if specifier == FACADE_ID {
            return Ok(ResolveResult::Resolved(FACADE_ID.to_string()));
        }

        if let Some(global) = self.state.externals.get(specifier) {
            return Ok(ResolveResult::external(specifier, Some(global.clone())));
        }

        if self.state.owner(specifier) == Some(self.entry) {
            return Ok(ResolveResult::Resolved(specifier.to_string()));
        }

        let chunk = self
            .state
            .find_chunk(specifier, importer)
            .ok_or_else(|| unexpected(specifier, importer))?;
        let owner = self
            .state
            .owner(chunk.as_str())
            .ok_or_else(|| unexpected(specifier, importer))?;

        if owner == self.entry {
            return Ok(ResolveResult::Resolved(chunk.to_string()));
        }

        let global = self.state.global_of(owner, chunk);
        trace!("{} -> {} (global {})", specifier, chunk, global);
        Ok(ResolveResult::external(chunk.as_str(), Some(global)))
    }

    fn load(&self, id: &str) -> Result<LoadResult, MergeError> {
        if id == FACADE_ID {
            return Ok(LoadResult::new(self.facade.as_str()));
        }
        self.state.load_chunk(id)
    }
}

/// Loader of a module-mode merge: every chunk is bundled, only external globals stay
/// outside
pub(crate) struct SplitLoader<'a> {
    pub(crate) state: &'a MergerState,
}

impl ModuleLoader for SplitLoader<'_> {
    fn name(&self) -> &str {
        "merge-split"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> Result<ResolveResult, MergeError> {
        if let Some(global) = self.state.externals.get(specifier) {
            return Ok(ResolveResult::external(specifier, Some(global.clone())));
        }

        self.state
            .find_chunk(specifier, importer)
            .map(|chunk| ResolveResult::Resolved(chunk.to_string()))
            .ok_or_else(|| unexpected(specifier, importer))
    }

    fn load(&self, id: &str) -> Result<LoadResult, MergeError> {
        self.state.load_chunk(id)
    }
}

fn unexpected(specifier: &str, importer: Option<&str>) -> MergeError {
    MergeError::UnexpectedModule {
        id: specifier.to_string(),
        importer: importer.map(str::to_string),
    }
}
