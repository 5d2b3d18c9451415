/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Degree-based partitioning of the node space.
//!
//! Partitions are not sized by number of nodes, but by accumulated outdegree,
//! so that every worker has about the same number of arcs to scan, and a
//! partition containing a few very high-degree nodes does not become a
//! straggler. The fine-grained partitions produced by [`degree_partition`]
//! are then grouped by [`merge_partitions`] so that their number does not
//! exceed the number of workers.

use crate::traits::Graph;
use std::ops::Range;

/// A contiguous range of nodes assigned to a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    start_node: usize,
    node_count: usize,
}

impl Partition {
    /// The maximum number of nodes in a partition, so that nodes can be
    /// addressed within a partition using 32-bit offsets.
    pub const MAX_NODE_COUNT: usize = (i32::MAX - 32) as usize;

    pub fn new(start_node: usize, node_count: usize) -> Self {
        Self {
            start_node,
            node_count,
        }
    }

    /// Returns the first node of the partition.
    #[inline(always)]
    pub fn start_node(&self) -> usize {
        self.start_node
    }

    /// Returns the number of nodes in the partition.
    #[inline(always)]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Returns the first node after the partition.
    #[inline(always)]
    pub fn end_node(&self) -> usize {
        self.start_node + self.node_count
    }

    /// Returns the nodes of the partition.
    #[inline(always)]
    pub fn nodes(&self) -> Range<usize> {
        self.start_node..self.end_node()
    }
}

impl core::fmt::Display for Partition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{} . . {})", self.start_node, self.end_node())
    }
}

/// Splits the nodes of `graph` into contiguous partitions of similar
/// accumulated outdegree.
///
/// The budget of a partition is `batch_size` times the average outdegree
/// (at least one). A `batch_size` of zero means no bound, in which case the
/// budget is [`Partition::MAX_NODE_COUNT`] times the average outdegree.
/// Nodes are accumulated greedily while the outdegree sum stays within
/// budget; a partition always contains at least one node, and never more
/// than [`Partition::MAX_NODE_COUNT`] nodes.
///
/// The returned partitions are ordered, disjoint, and cover all nodes.
pub fn degree_partition(graph: &impl Graph, batch_size: usize) -> Vec<Partition> {
    let num_nodes = graph.num_nodes();
    if num_nodes == 0 {
        return vec![];
    }

    let average_degree = (graph.num_arcs() / num_nodes as u64).max(1);
    let batch_size = match batch_size {
        0 => Partition::MAX_NODE_COUNT,
        b => b.min(Partition::MAX_NODE_COUNT),
    } as u64;
    let budget = batch_size.saturating_mul(average_degree);

    let mut partitions = Vec::new();
    let mut start = 0;
    while start < num_nodes {
        let mut end = start;
        let mut degree_sum = 0_u64;
        while end < num_nodes && end - start < Partition::MAX_NODE_COUNT {
            let degree = graph.outdegree(end) as u64;
            if end > start && degree_sum + degree > budget {
                break;
            }
            degree_sum += degree;
            end += 1;
        }
        partitions.push(Partition::new(start, end - start));
        start = end;
    }

    log::debug!(
        "Degree partitioning with budget {budget} produced {} partitions",
        partitions.len()
    );
    partitions
}

/// Groups consecutive partitions so that there are at most `concurrency`
/// of them.
///
/// If there are more than `concurrency` partitions, exactly `concurrency`
/// groups are formed, group `k` containing the partitions with index in
/// [`k` · *P* / `concurrency` . . (`k` + 1) · *P* / `concurrency`), where
/// *P* is the number of partitions; group sizes thus differ by at most one.
/// Otherwise, the input is returned unchanged.
pub fn merge_partitions(partitions: Vec<Partition>, concurrency: usize) -> Vec<Partition> {
    let concurrency = concurrency.max(1);
    let num_partitions = partitions.len();
    if num_partitions <= concurrency {
        return partitions;
    }

    (0..concurrency)
        .map(|k| {
            let start = k * num_partitions / concurrency;
            let end = (k + 1) * num_partitions / concurrency;
            let group = &partitions[start..end];
            let node_count = group.iter().map(Partition::node_count).sum();
            Partition::new(group[0].start_node(), node_count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::vec_graph::VecGraph;

    fn assert_coverage(partitions: &[Partition], num_nodes: usize) {
        let mut next = 0;
        for p in partitions {
            assert_eq!(p.start_node(), next, "Gap or overlap at {p}");
            assert!(p.node_count() > 0, "Empty partition {p}");
            next = p.end_node();
        }
        assert_eq!(next, num_nodes);
    }

    /// A graph in which node `i` has outdegree `degrees[i]`.
    fn graph_with_degrees(degrees: &[usize]) -> VecGraph {
        let n = degrees.len();
        let mut g = VecGraph::empty(n);
        for (u, &d) in degrees.iter().enumerate() {
            for k in 1..=d {
                g.add_arc(u, (u + k) % n);
            }
        }
        g
    }

    #[test]
    fn test_empty() {
        assert!(degree_partition(&VecGraph::empty(0), 10).is_empty());
        assert!(merge_partitions(vec![], 4).is_empty());
    }

    #[test]
    fn test_unbounded_batch() {
        let g = graph_with_degrees(&[3, 1, 4, 1, 5, 7, 2, 6]);
        let partitions = degree_partition(&g, 0);
        assert_eq!(partitions, vec![Partition::new(0, 8)]);
    }

    #[test]
    fn test_balanced_by_degree() {
        // 29 arcs over 8 nodes: average degree 3, budget 6
        let g = graph_with_degrees(&[3, 1, 4, 1, 5, 7, 2, 6]);
        let partitions = degree_partition(&g, 2);
        assert_eq!(
            partitions,
            vec![
                Partition::new(0, 2),
                Partition::new(2, 2),
                Partition::new(4, 1),
                Partition::new(5, 1),
                Partition::new(6, 1),
                Partition::new(7, 1),
            ]
        );
        assert_coverage(&partitions, 8);
    }

    #[test]
    fn test_isolated_nodes() {
        // no arcs: the average degree is clamped to one, so every
        // partition can take any number of nodes
        let g = VecGraph::empty(100);
        let partitions = degree_partition(&g, 7);
        assert_eq!(partitions, vec![Partition::new(0, 100)]);
    }

    #[test]
    fn test_coverage_random() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};
        let mut rng = SmallRng::seed_from_u64(0);
        for _ in 0..20 {
            let n = rng.random_range(1..300);
            let degrees: Vec<usize> = (0..n).map(|_| rng.random_range(0..n.min(20))).collect();
            let g = graph_with_degrees(&degrees);
            for batch_size in [0, 1, 2, 5, 64] {
                let partitions = degree_partition(&g, batch_size);
                assert_coverage(&partitions, n);
                for concurrency in [0, 1, 2, 3, 7, 16] {
                    let merged = merge_partitions(partitions.clone(), concurrency);
                    assert_coverage(&merged, n);
                    assert!(merged.len() <= concurrency.max(1));
                    assert_eq!(merged.len(), partitions.len().min(concurrency.max(1)));
                }
            }
        }
    }

    #[test]
    fn test_merge_group_size() {
        let partitions: Vec<_> = (0..10).map(|i| Partition::new(i * 3, 3)).collect();
        // boundaries 0, 2, 5, 7, 10
        let merged = merge_partitions(partitions.clone(), 4);
        assert_eq!(
            merged,
            vec![
                Partition::new(0, 6),
                Partition::new(6, 9),
                Partition::new(15, 6),
                Partition::new(21, 9),
            ]
        );
        let merged = merge_partitions(partitions.clone(), 9);
        assert_eq!(merged.len(), 9);
        assert_coverage(&merged, 30);
        assert_eq!(merge_partitions(partitions.clone(), 10), partitions);
        assert_eq!(merge_partitions(partitions, 1), vec![Partition::new(0, 30)]);
    }
}
