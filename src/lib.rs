//! chunkmerge library
//!
//! Allocates the chunks of a code-splitting build to the entry points that need them and
//! merges each entry's chunks into a single output.

pub mod allocator;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod linker;
pub mod merger;
pub mod utils;

pub use allocator::{compute_chunk_allocation, ChunkAllocation};
pub use bundler::{Bundler, Chunk, ChunkId, ChunkRef, ChunkSet};
pub use cli::Cli;
pub use config::Config;
pub use error::{AllocationError, MergeError};
pub use linker::Linker;
pub use merger::ChunkMerger;
