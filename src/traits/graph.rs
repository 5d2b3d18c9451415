/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Basic trait to access graphs from the rank engine.

The engine never mutates a graph: it needs the number of nodes and arcs, the
outdegree of each node, a way to enumerate the (possibly weighted) successors
of a node, and an independent traversal handle for each worker.

*/

/// A read-only graph providing random access to the successors of a node.
///
/// Successors are enumerated by [`for_each_successor`](Graph::for_each_successor)
/// through a visitor, so that implementations backed by stateful cursors can
/// avoid allocating iterators. Such implementations should make
/// [`concurrent_copy`](Graph::concurrent_copy) return a handle with its own
/// cursor: the engine obtains one copy per worker and never shares a copy
/// between threads.
pub trait Graph {
    /// Returns the number of nodes in the graph.
    fn num_nodes(&self) -> usize;

    /// Returns the number of arcs in the graph.
    fn num_arcs(&self) -> u64;

    /// Returns the number of successors of a node.
    fn outdegree(&self, node: usize) -> usize;

    /// Calls `visitor` with `(node, successor, weight)` for every successor
    /// of `node`, stopping early if the visitor returns false.
    ///
    /// Unweighted graphs must pass `default_weight` as weight.
    fn for_each_successor<F>(&self, node: usize, default_weight: f64, visitor: F)
    where
        F: FnMut(usize, usize, f64) -> bool;

    /// Returns an independent traversal handle on the same graph.
    fn concurrent_copy(&self) -> Self
    where
        Self: Sized;

    /// Maps an original (external) node identifier to a node of the graph,
    /// returning `None` if the identifier is unknown.
    ///
    /// The default implementation assumes original identifiers and nodes
    /// coincide.
    fn to_mapped_node_id(&self, original_id: u64) -> Option<usize> {
        usize::try_from(original_id)
            .ok()
            .filter(|&node| node < self.num_nodes())
    }
}

impl<G: Graph> Graph for &G {
    #[inline(always)]
    fn num_nodes(&self) -> usize {
        (**self).num_nodes()
    }

    #[inline(always)]
    fn num_arcs(&self) -> u64 {
        (**self).num_arcs()
    }

    #[inline(always)]
    fn outdegree(&self, node: usize) -> usize {
        (**self).outdegree(node)
    }

    #[inline(always)]
    fn for_each_successor<F>(&self, node: usize, default_weight: f64, visitor: F)
    where
        F: FnMut(usize, usize, f64) -> bool,
    {
        (**self).for_each_successor(node, default_weight, visitor)
    }

    /// A shared reference carries no cursor state, so it is its own copy.
    #[inline(always)]
    fn concurrent_copy(&self) -> Self {
        *self
    }

    #[inline(always)]
    fn to_mapped_node_id(&self, original_id: u64) -> Option<usize> {
        (**self).to_mapped_node_id(original_id)
    }
}
