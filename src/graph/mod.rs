//! Directed graph kernel
//!
//! Nodes live in an arena: a node is a `usize` index into parallel vectors holding
//! its id and adjacency. Two extensions build on the kernel:
//! - [`LeafGraph`]: every sink reachable from each node
//! - [`DescendantGraph`]: every node reachable from each node, plus infimum queries

mod leafs;
mod ordering;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

pub use leafs::LeafGraph;
pub use ordering::DescendantGraph;

/// Raised by [`DirectedGraph::sort`] when some nodes never lose their inbound edges
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("graph contains a cycle among: {}", .remaining.join(", "))]
pub struct CycleError {
    /// Ids left unsorted, in iteration order
    pub remaining: Vec<String>,
}

/// A directed graph addressed by ids
#[derive(Debug, Clone)]
pub struct DirectedGraph<I> {
    /// Node ids, indexed by node
    ids: Vec<I>,

    /// Map from id to node
    index: HashMap<I, usize>,

    /// Outbound edges: node -> targets
    outbound: Vec<Vec<usize>>,

    /// Inbound edges: node -> sources
    inbound: Vec<Vec<usize>>,

    /// Iteration order; insertion order until `sort` replaces it
    order: Vec<usize>,
}

impl<I> Default for DirectedGraph<I> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            index: HashMap::new(),
            outbound: Vec::new(),
            inbound: Vec::new(),
            order: Vec::new(),
        }
    }
}

impl<I: Clone + Eq + Hash + fmt::Display> DirectedGraph<I> {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns the existing node when the id is known
    pub fn add_node(&mut self, id: I) -> usize {
        if let Some(&node) = self.index.get(&id) {
            return node;
        }

        let node = self.ids.len();
        self.ids.push(id.clone());
        self.index.insert(id, node);
        self.outbound.push(Vec::new());
        self.inbound.push(Vec::new());
        self.order.push(node);

        node
    }

    /// Add an edge, creating missing endpoints. Duplicate edges are ignored.
    pub fn add_edge(&mut self, source: I, target: I) {
        let source = self.add_node(source);
        let target = self.add_node(target);

        if self.outbound[source].contains(&target) {
            return;
        }

        self.outbound[source].push(target);
        self.inbound[target].push(source);
    }

    /// Look up the node of an id
    pub fn node(&self, id: &I) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Id of a node
    pub fn id(&self, node: usize) -> &I {
        &self.ids[node]
    }

    pub fn contains(&self, id: &I) -> bool {
        self.index.contains_key(id)
    }

    /// Ids in iteration order
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = &I> + '_ {
        self.order.iter().map(move |&node| &self.ids[node])
    }

    /// Ids of the direct targets of `id`
    pub fn targets(&self, id: &I) -> Vec<&I> {
        self.node(id)
            .map(|node| self.outbound[node].iter().map(|&t| &self.ids[t]).collect())
            .unwrap_or_default()
    }

    /// Ids of the direct sources of `id`
    pub fn sources(&self, id: &I) -> Vec<&I> {
        self.node(id)
            .map(|node| self.inbound[node].iter().map(|&s| &self.ids[s]).collect())
            .unwrap_or_default()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.outbound[node].is_empty()
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Topologically sort the graph, roots first (Kahn's algorithm)
    ///
    /// Each step takes the earliest node, in the current iteration order, that has no
    /// remaining inbound edges. Edges are left untouched and the iteration order becomes
    /// the sorted order, so sorting again returns the same list.
    pub fn sort(&mut self) -> Result<Vec<I>, CycleError> {
        let mut position = vec![0; self.ids.len()];
        for (pos, &node) in self.order.iter().enumerate() {
            position[node] = pos;
        }

        let mut remaining_inbound: Vec<usize> = self.inbound.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<(usize, usize)> = self
            .order
            .iter()
            .filter(|&&node| remaining_inbound[node] == 0)
            .map(|&node| (position[node], node))
            .collect();

        let mut sorted = Vec::with_capacity(self.ids.len());

        while let Some((_, node)) = ready.pop_first() {
            sorted.push(node);

            for &target in &self.outbound[node] {
                remaining_inbound[target] -= 1;
                if remaining_inbound[target] == 0 {
                    ready.insert((position[target], target));
                }
            }
        }

        if sorted.len() != self.ids.len() {
            let remaining = self
                .order
                .iter()
                .filter(|&&node| remaining_inbound[node] > 0)
                .map(|&node| self.ids[node].to_string())
                .collect();
            return Err(CycleError { remaining });
        }

        self.order = sorted;

        Ok(self.ids().cloned().collect())
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn outbound(&self, node: usize) -> &[usize] {
        &self.outbound[node]
    }

    pub(crate) fn inbound(&self, node: usize) -> &[usize] {
        &self.inbound[node]
    }
}
