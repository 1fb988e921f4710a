//! Chunk allocation
//!
//! The host bundler emits at most one chunk per combination of entry points that share
//! code. Every chunk must end up physically inside exactly one entry output: the most
//! specific entry that all of the chunk's consumers depend on. Within an entry, chunks
//! are ordered so that imported chunks come before their importers.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::bundler::{ChunkId, ChunkRef};
use crate::error::AllocationError;
use crate::graph::{DescendantGraph, LeafGraph};
use crate::utils::MultiMap;

/// Entry id -> chunk ids embedded in that entry, dependencies first
pub type ChunkAllocation = MultiMap<ChunkId, ChunkId>;

/// Decide which entry embeds each chunk
///
/// `chunk_imports` maps every chunk to the chunks it imports. `entry_deps` maps every
/// entry to its direct prerequisite entries and must be ordered root-to-leaf.
pub fn compute_chunk_allocation(
    chunk_imports: &IndexMap<ChunkId, Vec<ChunkId>>,
    entry_deps: &MultiMap<ChunkId, ChunkId>,
) -> Result<ChunkAllocation, AllocationError> {
    let classify = |id: &ChunkId| ChunkRef::classify(id, |id| entry_deps.contains_key(id));

    // Edges point from an imported chunk to its importer, so the leafs reachable from a
    // chunk are the entries that need it.
    let mut chunk_graph = LeafGraph::new();
    for chunk in chunk_imports.keys() {
        chunk_graph.add_node(chunk.clone());
    }
    for (chunk, imported) in chunk_imports
        .iter()
        .flat_map(|(chunk, imports)| imports.iter().map(move |imported| (chunk, imported)))
    {
        // Ordering between entries comes from the entry graph alone
        if classify(chunk).is_entry() && classify(imported).is_entry() {
            continue;
        }
        chunk_graph.add_edge(imported.clone(), chunk.clone());
    }
    chunk_graph.populate_leaf_sets();

    let mut entry_graph = DescendantGraph::new();
    for entry in entry_deps.keys() {
        entry_graph.add_node(entry.clone());
    }
    for (entry, prerequisite) in entry_deps.iter() {
        entry_graph.add_edge(prerequisite.clone(), entry.clone());
    }
    entry_graph.populate_descendants();

    let mut allocation = ChunkAllocation::new();
    for entry in entry_deps.keys() {
        allocation.add_key(entry.clone());
    }

    for chunk in chunk_imports.keys().map(classify) {
        let required_by = chunk_graph.leafs_of(chunk.id());
        let owner = entry_graph
            .infimum(&required_by)
            .ok_or_else(|| AllocationError::NoCommonRoot {
                chunk: chunk.id().clone(),
                required_by: required_by.clone(),
            })?;

        debug!(
            "Allocating {}{} to {} (required by {:?})",
            chunk.id(),
            if chunk.is_entry() { " (entry)" } else { "" },
            owner,
            required_by
        );
        allocation.add(owner, chunk.id().clone());
    }

    let sorted = chunk_graph.sort()?;
    let rank: HashMap<&ChunkId, usize> = sorted
        .iter()
        .enumerate()
        .map(|(index, chunk)| (chunk, index))
        .collect();

    let entries: Vec<ChunkId> = allocation.keys().cloned().collect();
    for entry in entries {
        let mut chunks: Vec<ChunkId> = allocation.values(&entry).cloned().collect();
        chunks.sort_by_key(|chunk| rank.get(chunk).copied().unwrap_or(usize::MAX));
        allocation.put_all(entry, chunks);
    }

    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(names: &[&str]) -> Vec<ChunkId> {
        names.iter().map(|name| ChunkId::new(*name)).collect()
    }

    fn chunk_map(entries: &[(&str, &[&str])]) -> IndexMap<ChunkId, Vec<ChunkId>> {
        entries
            .iter()
            .map(|(chunk, imports)| (ChunkId::new(*chunk), ids(imports)))
            .collect()
    }

    fn entry_map(entries: &[(&str, &[&str])]) -> MultiMap<ChunkId, ChunkId> {
        entries
            .iter()
            .map(|(entry, deps)| (ChunkId::new(*entry), ids(deps)))
            .collect()
    }

    fn allocated(allocation: &ChunkAllocation, entry: &str) -> Vec<String> {
        allocation
            .values(&ChunkId::new(entry))
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn test_single_chunk_is_trivial() {
        let allocation = compute_chunk_allocation(
            &chunk_map(&[("entry.js", &[])]),
            &entry_map(&[("entry.js", &[])]),
        )
        .unwrap();

        assert_eq!(allocation.len(), 1);
        assert_eq!(allocated(&allocation, "entry.js"), vec!["entry.js"]);
    }

    fn diamond_chunks() -> IndexMap<ChunkId, Vec<ChunkId>> {
        chunk_map(&[
            ("a.js", &["ab.js", "ac.js", "ad.js", "abc.js", "abd.js", "acd.js", "abcd.js"]),
            ("b.js", &["ab.js", "bc.js", "bd.js", "abc.js", "abd.js", "bcd.js", "abcd.js"]),
            ("c.js", &["ac.js", "bc.js", "cd.js", "abc.js", "acd.js", "bcd.js", "abcd.js"]),
            ("d.js", &["ad.js", "bd.js", "cd.js", "abd.js", "acd.js", "bcd.js", "abcd.js"]),
            ("ab.js", &["abc.js", "abd.js", "abcd.js"]),
            ("ac.js", &["abc.js", "acd.js", "abcd.js"]),
            ("ad.js", &["abd.js", "acd.js", "abcd.js"]),
            ("bc.js", &["abc.js", "bcd.js", "abcd.js"]),
            ("bd.js", &["abd.js", "bcd.js", "abcd.js"]),
            ("cd.js", &["acd.js", "bcd.js", "abcd.js"]),
            ("abc.js", &["abcd.js"]),
            ("abd.js", &["abcd.js"]),
            ("acd.js", &["abcd.js"]),
            ("bcd.js", &["abcd.js"]),
            ("abcd.js", &[]),
        ])
    }

    fn diamond_entries() -> MultiMap<ChunkId, ChunkId> {
        entry_map(&[
            ("a.js", &[]),
            ("b.js", &["a.js"]),
            ("c.js", &["a.js"]),
            ("d.js", &["b.js", "c.js"]),
        ])
    }

    #[test]
    fn test_diamond_allocation() {
        let chunks = diamond_chunks();
        let allocation = compute_chunk_allocation(&chunks, &diamond_entries()).unwrap();

        let keys: Vec<String> = allocation.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a.js", "b.js", "c.js", "d.js"]);
        assert_eq!(allocated(&allocation, "b.js"), vec!["bd.js", "b.js"]);
        assert_eq!(allocated(&allocation, "c.js"), vec!["cd.js", "c.js"]);
        assert_eq!(allocated(&allocation, "d.js"), vec!["d.js"]);

        let a = allocated(&allocation, "a.js");
        assert_eq!(a[0], "abcd.js");
        assert_eq!(a.len(), 10);
        for chunk in ["ab.js", "ac.js", "ad.js", "bc.js", "bcd.js", "a.js"] {
            assert!(a.iter().any(|c| c == chunk), "{} allocated to a.js", chunk);
        }

        // Dependencies precede their importers
        for (chunk, imports) in &chunks {
            for imported in imports {
                let chunk_pos = a.iter().position(|c| c == chunk.as_str());
                let imported_pos = a.iter().position(|c| c == imported.as_str());
                if let (Some(chunk_pos), Some(imported_pos)) = (chunk_pos, imported_pos) {
                    assert!(imported_pos < chunk_pos, "{} before {}", imported, chunk);
                }
            }
        }
    }

    #[test]
    fn test_every_chunk_allocated_exactly_once() {
        let chunks = diamond_chunks();
        let allocation = compute_chunk_allocation(&chunks, &diamond_entries()).unwrap();

        let mut seen: Vec<&ChunkId> = allocation.iter().map(|(_, chunk)| chunk).collect();
        seen.sort();
        let mut expected: Vec<&ChunkId> = chunks.keys().collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_removes_dependencies_among_entries() {
        let allocation = compute_chunk_allocation(
            &chunk_map(&[
                ("chunk-1.js", &[]),
                ("chunk-2.js", &[]),
                ("entry-1.js", &["chunk-1.js"]),
                ("entry-2.js", &["chunk-1.js", "chunk-2.js", "entry-1.js"]),
            ]),
            &entry_map(&[("entry-1.js", &[]), ("entry-2.js", &["entry-1.js"])]),
        )
        .unwrap();

        assert_eq!(allocated(&allocation, "entry-1.js"), vec!["chunk-1.js", "entry-1.js"]);
        assert_eq!(allocated(&allocation, "entry-2.js"), vec!["chunk-2.js", "entry-2.js"]);
    }

    #[test]
    fn test_external_imports_are_not_allocated() {
        let allocation = compute_chunk_allocation(
            &chunk_map(&[("entry.js", &["react"])]),
            &entry_map(&[("entry.js", &[])]),
        )
        .unwrap();

        assert_eq!(allocated(&allocation, "entry.js"), vec!["entry.js"]);
    }

    #[test]
    fn test_disconnected_entries_sharing_a_chunk_fail() {
        let err = compute_chunk_allocation(
            &chunk_map(&[
                ("shared.js", &[]),
                ("x.js", &["shared.js"]),
                ("y.js", &["shared.js"]),
            ]),
            &entry_map(&[("x.js", &[]), ("y.js", &[])]),
        )
        .unwrap_err();

        match err {
            AllocationError::NoCommonRoot { chunk, required_by } => {
                assert_eq!(chunk.as_str(), "shared.js");
                assert_eq!(required_by, ids(&["x.js", "y.js"]));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_cyclic_chunk_graph_fails() {
        let err = compute_chunk_allocation(
            &chunk_map(&[
                ("p.js", &["q.js"]),
                ("q.js", &["p.js"]),
                ("entry.js", &["p.js"]),
            ]),
            &entry_map(&[("entry.js", &[])]),
        )
        .unwrap_err();

        assert!(matches!(err, AllocationError::Cycle(_)));
    }

    #[test]
    fn test_is_deterministic() {
        let chunks = diamond_chunks();
        let first = compute_chunk_allocation(&chunks, &diamond_entries()).unwrap();
        let second = compute_chunk_allocation(&chunks, &diamond_entries()).unwrap();

        assert_eq!(first, second);
    }
}
