//! Error types of the allocation and merge core
//!
//! Both kinds signal an inconsistency between the entry declarations and the chunks the
//! host bundler produced. They are fatal to the build and are never retried.

use thiserror::Error;

use crate::bundler::ChunkId;
use crate::graph::CycleError;

/// Failure to assign a chunk to an entry
#[derive(Debug, Error)]
pub enum AllocationError {
    /// No entry is upstream of every entry that needs the chunk
    #[error("cannot find a common root entry of chunk `{chunk}`, required by [{}]", join_ids(.required_by))]
    NoCommonRoot {
        chunk: ChunkId,
        required_by: Vec<ChunkId>,
    },

    #[error("chunk graph is not acyclic: {0}")]
    Cycle(#[from] CycleError),
}

/// Failure while merging allocated chunks into entry outputs
#[derive(Debug, Error)]
pub enum MergeError {
    /// A module was requested that is neither the facade, an external global nor a
    /// known chunk
    #[error("unexpected module in output chunk: `{id}`{}", importer_suffix(.importer))]
    UnexpectedModule {
        id: String,
        importer: Option<String>,
    },

    #[error("chunk `{0}` is allocated but missing from the chunk set")]
    MissingChunk(ChunkId),

    /// A single-entry merge must produce exactly one output
    #[error("merging `{entry}` produced {count} outputs, expected exactly one")]
    OutputCount { entry: ChunkId, count: usize },

    #[error("output format `{0}` cannot hold more than one input")]
    UnsupportedFormat(&'static str),

    /// Module code uses import/export syntax the linker cannot rewrite
    #[error("cannot link `{id}`: {message}")]
    Syntax { id: String, message: String },

    #[error("invalid source map: {0}")]
    SourceMap(#[from] sourcemap::Error),

    /// Any other failure reported by a host bundler
    #[error("host bundler failed: {0}")]
    Bundler(String),
}

fn join_ids(ids: &[ChunkId]) -> String {
    ids.iter().map(ChunkId::as_str).collect::<Vec<_>>().join(", ")
}

fn importer_suffix(importer: &Option<String>) -> String {
    importer
        .as_ref()
        .map(|importer| format!(" (imported by `{}`)", importer))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_ids() {
        let err = AllocationError::NoCommonRoot {
            chunk: ChunkId::new("shared.js"),
            required_by: vec![ChunkId::new("x.js"), ChunkId::new("y.js")],
        };
        assert_eq!(
            err.to_string(),
            "cannot find a common root entry of chunk `shared.js`, required by [x.js, y.js]"
        );

        let err = MergeError::UnexpectedModule {
            id: "./lost.js".to_string(),
            importer: Some("entry.js".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "unexpected module in output chunk: `./lost.js` (imported by `entry.js`)"
        );
    }
}
