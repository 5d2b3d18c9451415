/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::traits::Graph;
use std::collections::HashMap;
use std::sync::Arc;

/// A mutable [`Graph`] implementation based on a vector of vectors.
///
/// Successors are kept sorted and without duplicates. Arcs can be added with
/// or without a weight: as soon as a weighted arc is added the graph becomes
/// weighted, and arcs added without a weight get weight one. An unweighted
/// graph reports to visitors the default weight they request.
///
/// Nodes can optionally be associated with original (external) identifiers
/// using [`VecGraph::with_original_ids`]; otherwise, original identifiers and
/// nodes coincide.
///
/// The data is shared through reference counting, so cloning a graph (and
/// thus taking a [concurrent copy](Graph::concurrent_copy)) does not copy
/// it; a clone that is later modified gets its own copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VecGraph {
    /// The number of arcs in the graph.
    number_of_arcs: u64,
    /// For each node, its sorted list of successors with their weight.
    succ: Arc<Vec<Vec<(usize, f64)>>>,
    /// Whether any weighted arc was added.
    weighted: bool,
    /// The original identifiers of the nodes, if any.
    original_ids: Option<Arc<[u64]>>,
    /// The inverse of `original_ids`.
    mapping: Arc<HashMap<u64, usize>>,
}

impl VecGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty graph with `n` nodes.
    pub fn empty(n: usize) -> Self {
        Self {
            succ: Arc::new(Vec::from_iter((0..n).map(|_| Vec::new()))),
            ..Self::default()
        }
    }

    /// Creates a new graph from an iterator of arcs.
    ///
    /// The number of nodes is the largest node appearing in an arc plus one.
    pub fn from_arcs(arcs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut g = Self::new();
        g.add_arcs(arcs);
        g
    }

    /// Creates a new weighted graph from an iterator of weighted arcs.
    pub fn from_weighted_arcs(arcs: impl IntoIterator<Item = (usize, usize, f64)>) -> Self {
        let mut g = Self::new();
        g.add_weighted_arcs(arcs);
        g
    }

    /// Associates every node with an original identifier.
    ///
    /// # Panics
    ///
    /// Panics if the number of identifiers is not the number of nodes, or if
    /// an identifier appears twice.
    pub fn with_original_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        let ids: Arc<[u64]> = ids.into_iter().collect();
        assert_eq!(
            ids.len(),
            self.succ.len(),
            "Expected {} original identifiers, got {}",
            self.succ.len(),
            ids.len()
        );
        let mut mapping = HashMap::with_capacity(ids.len());
        for (node, &id) in ids.iter().enumerate() {
            if mapping.insert(id, node).is_some() {
                panic!("Duplicate original identifier {id}");
            }
        }
        self.mapping = Arc::new(mapping);
        self.original_ids = Some(ids);
        self
    }

    /// Returns the original identifier of a node.
    pub fn original_id(&self, node: usize) -> u64 {
        match &self.original_ids {
            Some(ids) => ids[node],
            None => node as u64,
        }
    }

    /// Returns whether the graph carries arc weights.
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Adds an isolated node to the graph and returns true if it is a new
    /// node. Nodes between the current number of nodes and `node` are added,
    /// too.
    pub fn add_node(&mut self, node: usize) -> bool {
        let len = self.succ.len();
        if len <= node {
            Arc::make_mut(&mut self.succ).extend((len..=node).map(|_| Vec::new()));
        }
        len <= node
    }

    /// Adds an arc to the graph and returns true if it is a new arc.
    ///
    /// Missing endpoints are added as new nodes.
    pub fn add_arc(&mut self, u: usize, v: usize) -> bool {
        self.insert(u, v, 1.0)
    }

    /// Adds a weighted arc to the graph and returns true if it is a new arc.
    ///
    /// Missing endpoints are added as new nodes.
    pub fn add_weighted_arc(&mut self, u: usize, v: usize, weight: f64) -> bool {
        self.weighted = true;
        self.insert(u, v, weight)
    }

    /// Adds arcs from an iterator.
    pub fn add_arcs(&mut self, arcs: impl IntoIterator<Item = (usize, usize)>) -> &mut Self {
        for (u, v) in arcs {
            self.add_arc(u, v);
        }
        self
    }

    /// Adds weighted arcs from an iterator.
    pub fn add_weighted_arcs(
        &mut self,
        arcs: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> &mut Self {
        for (u, v, w) in arcs {
            self.add_weighted_arc(u, v, w);
        }
        self
    }

    /// Returns an iterator over the successors of a node.
    pub fn successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.succ[node].iter().map(|&(v, _)| v)
    }

    fn insert(&mut self, u: usize, v: usize, weight: f64) -> bool {
        self.add_node(u.max(v));
        let succ = &mut Arc::make_mut(&mut self.succ)[u];
        match succ.binary_search_by(|&(s, _)| s.cmp(&v)) {
            // no duplicated arcs
            Ok(_) => false,
            Err(pos) => {
                succ.insert(pos, (v, weight));
                self.number_of_arcs += 1;
                true
            }
        }
    }
}

impl Graph for VecGraph {
    fn num_nodes(&self) -> usize {
        self.succ.len()
    }

    fn num_arcs(&self) -> u64 {
        self.number_of_arcs
    }

    fn outdegree(&self, node: usize) -> usize {
        self.succ[node].len()
    }

    fn for_each_successor<F>(&self, node: usize, default_weight: f64, mut visitor: F)
    where
        F: FnMut(usize, usize, f64) -> bool,
    {
        for &(succ, weight) in &self.succ[node] {
            let weight = if self.weighted { weight } else { default_weight };
            if !visitor(node, succ, weight) {
                break;
            }
        }
    }

    fn concurrent_copy(&self) -> Self {
        self.clone()
    }

    fn to_mapped_node_id(&self, original_id: u64) -> Option<usize> {
        match &self.original_ids {
            Some(_) => self.mapping.get(&original_id).copied(),
            None => usize::try_from(original_id)
                .ok()
                .filter(|&node| node < self.succ.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_no_duplicates() {
        let mut g = VecGraph::empty(3);
        assert!(g.add_arc(0, 2));
        assert!(g.add_arc(0, 1));
        assert!(!g.add_arc(0, 2));
        assert_eq!(g.num_arcs(), 2);
        assert_eq!(g.successors(0).collect::<Vec<_>>(), vec![1, 2]);
        assert!(g.add_arc(4, 0));
        assert_eq!(g.num_nodes(), 5);
    }

    #[test]
    fn test_weights() {
        let g = VecGraph::from_arcs([(0, 1), (0, 2)]);
        let mut weights = vec![];
        g.for_each_successor(0, 0.5, |_, _, w| {
            weights.push(w);
            true
        });
        assert_eq!(weights, vec![0.5, 0.5]);

        let g = VecGraph::from_weighted_arcs([(0, 1, 0.3), (0, 2, 0.7)]);
        let mut weights = vec![];
        g.for_each_successor(0, 0.5, |_, _, w| {
            weights.push(w);
            false
        });
        assert_eq!(weights, vec![0.3]);
    }

    #[test]
    fn test_original_ids() {
        let g = VecGraph::from_arcs([(0, 1), (1, 2)]).with_original_ids([10, 20, 30]);
        assert_eq!(g.to_mapped_node_id(20), Some(1));
        assert_eq!(g.to_mapped_node_id(1), None);
        assert_eq!(g.original_id(2), 30);

        let g = VecGraph::empty(3);
        assert_eq!(g.to_mapped_node_id(2), Some(2));
        assert_eq!(g.to_mapped_node_id(3), None);
    }

    #[test]
    fn test_concurrent_copy_shares_data() {
        let mut g = VecGraph::from_arcs([(0, 1), (1, 2)]).with_original_ids([10, 20, 30]);
        let copy = g.concurrent_copy();
        assert!(Arc::ptr_eq(&g.succ, &copy.succ));
        assert!(Arc::ptr_eq(&g.mapping, &copy.mapping));

        // copy on write
        g.add_arc(2, 0);
        assert!(!Arc::ptr_eq(&g.succ, &copy.succ));
        assert_eq!(g.num_arcs(), 3);
        assert_eq!(copy.num_arcs(), 2);
        assert_eq!(copy.successors(2).count(), 0);
    }
}
