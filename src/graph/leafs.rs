//! Leaf-set extension: which sinks can each node reach

use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;

use super::{CycleError, DirectedGraph};

/// A graph that records, for every node, the sinks reachable from it
#[derive(Debug, Clone)]
pub struct LeafGraph<I> {
    graph: DirectedGraph<I>,

    /// Reachable sinks per node, filled by `populate_leaf_sets`
    leafs: Vec<IndexSet<usize>>,
}

impl<I> Default for LeafGraph<I> {
    fn default() -> Self {
        Self {
            graph: DirectedGraph::default(),
            leafs: Vec::new(),
        }
    }
}

impl<I: Clone + Eq + Hash + fmt::Display> LeafGraph<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: I) -> usize {
        self.graph.add_node(id)
    }

    pub fn add_edge(&mut self, source: I, target: I) {
        self.graph.add_edge(source, target);
    }

    pub fn sort(&mut self) -> Result<Vec<I>, CycleError> {
        self.graph.sort()
    }

    /// The underlying graph
    pub fn graph(&self) -> &DirectedGraph<I> {
        &self.graph
    }

    /// Tag every node with each sink reachable from it
    ///
    /// Seeds from every sink and walks inbound edges upward. A sink's only leaf is
    /// itself.
    pub fn populate_leaf_sets(&mut self) {
        let graph = &self.graph;
        let mut leafs = vec![IndexSet::new(); graph.len()];

        for &sink in graph.order().iter().filter(|&&node| graph.is_leaf(node)) {
            let mut seen = vec![false; graph.len()];
            let mut stack = vec![sink];

            while let Some(node) = stack.pop() {
                if std::mem::replace(&mut seen[node], true) {
                    continue;
                }
                leafs[node].insert(sink);
                stack.extend(graph.inbound(node).iter().copied());
            }
        }

        self.leafs = leafs;
    }

    /// Sinks reachable from `id`; empty before `populate_leaf_sets` or for unknown ids
    pub fn leafs_of(&self, id: &I) -> Vec<I> {
        self.graph
            .node(id)
            .and_then(|node| self.leafs.get(node))
            .map(|leafs| leafs.iter().map(|&leaf| self.graph.id(leaf).clone()).collect())
            .unwrap_or_default()
    }
}
