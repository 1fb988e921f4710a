//! Descendant extension: reachability sets over a graph whose insertion order is
//! already topological (roots first)

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use super::{CycleError, DirectedGraph};

/// A graph answering "is B reachable from A" and infimum queries
///
/// Nodes must be inserted root-to-leaf; `populate_descendants` relies on that order.
#[derive(Debug, Clone)]
pub struct DescendantGraph<I> {
    graph: DirectedGraph<I>,

    /// Each node plus every node reachable from it
    descendants: Vec<HashSet<usize>>,
}

impl<I> Default for DescendantGraph<I> {
    fn default() -> Self {
        Self {
            graph: DirectedGraph::default(),
            descendants: Vec::new(),
        }
    }
}

impl<I: Clone + Eq + Hash + fmt::Display> DescendantGraph<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: I) -> usize {
        self.graph.add_node(id)
    }

    pub fn add_edge(&mut self, source: I, target: I) {
        self.graph.add_edge(source, target);
    }

    /// Sorting a graph built in topological order leaves it unchanged
    pub fn sort(&mut self) -> Result<Vec<I>, CycleError> {
        self.graph.sort()
    }

    pub fn graph(&self) -> &DirectedGraph<I> {
        &self.graph
    }

    /// Compute descendant sets, visiting nodes from the last to the first
    ///
    /// A node collects the descendants of targets whose edges were already marked
    /// visited, then marks its own inbound edges visited for its sources.
    pub fn populate_descendants(&mut self) {
        let graph = &self.graph;
        let mut descendants: Vec<HashSet<usize>> = vec![HashSet::new(); graph.len()];
        let mut visited_outbound: Vec<Vec<usize>> = vec![Vec::new(); graph.len()];

        for &node in graph.order().iter().rev() {
            let mut collected = HashSet::new();
            collected.insert(node);
            for &target in &visited_outbound[node] {
                collected.extend(descendants[target].iter().copied());
            }
            descendants[node] = collected;

            for &source in graph.inbound(node) {
                visited_outbound[source].push(node);
            }
        }

        self.descendants = descendants;
    }

    /// Whether `descendant` is `ancestor` itself or reachable from it
    pub fn is_descendant(&self, ancestor: &I, descendant: &I) -> bool {
        match (self.graph.node(ancestor), self.graph.node(descendant)) {
            (Some(a), Some(d)) => self
                .descendants
                .get(a)
                .map(|set| set.contains(&d))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// The most specific node that every target descends from
    ///
    /// Scans nodes from the last to the first and returns the first one whose
    /// descendants contain all targets.
    pub fn infimum(&self, targets: &[I]) -> Option<I> {
        let nodes: Vec<usize> = targets
            .iter()
            .map(|id| self.graph.node(id))
            .collect::<Option<_>>()?;

        self.graph
            .order()
            .iter()
            .rev()
            .find(|&&candidate| {
                self.descendants
                    .get(candidate)
                    .map(|set| nodes.iter().all(|node| set.contains(node)))
                    .unwrap_or(false)
            })
            .map(|&node| self.graph.id(node).clone())
    }
}
