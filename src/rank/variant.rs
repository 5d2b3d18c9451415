/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Centrality variants sharing the partitioned engine.
//!
//! The engine is variant-agnostic: a [`Variant`] decides the initial value
//! of seeded nodes, how the delta of a node is split among its successors,
//! the factor applied to incoming contributions, and how deltas are
//! rescaled using the global L2 norm. The available variants are
//!
//! - [`Standard`]: PageRank, splitting deltas evenly among successors;
//! - [`Weighted`]: PageRank, splitting deltas proportionally to positive
//!   arc weights;
//! - [`ArticleRank`]: splitting deltas by outdegree plus average outdegree,
//!   which damps the influence of nodes with few successors;
//! - [`Eigenvector`]: eigenvector centrality, propagating deltas unsplit and
//!   rescaling them by their global L2 norm.
//!
//! Rank mass of nodes without successors is never redistributed.

use crate::traits::Graph;
use rayon::prelude::*;

/// The default weight of arcs of unweighted graphs in the [`Weighted`]
/// variant.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A centrality variant.
pub trait Variant: Send + Sync {
    /// Prepares per-graph data before the first iteration.
    ///
    /// The method is called inside the thread pool of the computation.
    fn prepare<G: Graph + Sync>(&mut self, _graph: &G) {}

    /// Returns the initial value of seeded nodes, given the number of nodes
    /// of the graph and α = 1 − damping factor.
    fn initial_value(&self, _num_nodes: usize, alpha: f64) -> f64 {
        alpha
    }

    /// The factor applied, together with the damping factor, to the sum of
    /// the contributions received by a node.
    fn degree_factor(&self) -> f64 {
        1.0
    }

    /// Pushes the positive `delta` of `node` to its successors by calling
    /// `emit` with each successor and its share.
    fn propagate<G: Graph>(
        &self,
        graph: &G,
        node: usize,
        delta: f64,
        emit: &mut impl FnMut(usize, f32),
    );

    /// Rescales the deltas of a partition using the global L2 norm of all
    /// deltas.
    fn normalize(&self, _deltas: &mut [f64], _l2_norm: f64) {}
}

/// PageRank: the delta of a node is split evenly among its successors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standard;

impl Variant for Standard {
    #[inline]
    fn propagate<G: Graph>(
        &self,
        graph: &G,
        node: usize,
        delta: f64,
        emit: &mut impl FnMut(usize, f32),
    ) {
        let degree = graph.outdegree(node);
        if degree == 0 {
            return;
        }
        let share = (delta / degree as f64) as f32;
        graph.for_each_successor(node, DEFAULT_WEIGHT, |_, succ, _| {
            emit(succ, share);
            true
        });
    }
}

/// Weighted PageRank: the delta of a node is split among its successors
/// proportionally to the weights of the arcs.
///
/// Arcs with nonpositive weight receive nothing, and nodes whose positive
/// weights sum to zero propagate nothing. Unweighted graphs use
/// [`default_weight`](Weighted::default_weight) for all arcs: in particular,
/// a default weight of zero means no diffusion at all.
#[derive(Debug, Clone)]
pub struct Weighted {
    default_weight: f64,
    weight_sums: Box<[f64]>,
}

impl Default for Weighted {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHT)
    }
}

impl Weighted {
    pub fn new(default_weight: f64) -> Self {
        Self {
            default_weight,
            weight_sums: Box::default(),
        }
    }

    /// Returns the weight used for arcs of unweighted graphs.
    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    /// Returns the sums of positive outgoing weights computed by
    /// [`prepare`](Variant::prepare).
    pub fn weight_sums(&self) -> &[f64] {
        &self.weight_sums
    }
}

impl Variant for Weighted {
    fn prepare<G: Graph + Sync>(&mut self, graph: &G) {
        let default_weight = self.default_weight;
        self.weight_sums = (0..graph.num_nodes())
            .into_par_iter()
            .with_min_len(1024)
            .map(|node| {
                let mut sum = 0.0;
                graph.for_each_successor(node, default_weight, |_, _, w| {
                    if w > 0.0 {
                        sum += w;
                    }
                    true
                });
                sum
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
    }

    #[inline]
    fn propagate<G: Graph>(
        &self,
        graph: &G,
        node: usize,
        delta: f64,
        emit: &mut impl FnMut(usize, f32),
    ) {
        let weight_sum = self.weight_sums[node];
        if weight_sum <= 0.0 {
            return;
        }
        let unit = delta / weight_sum;
        graph.for_each_successor(node, self.default_weight, |_, succ, w| {
            if w > 0.0 {
                emit(succ, (unit * w) as f32);
            }
            true
        });
    }
}

/// ArticleRank: the delta of a node is split among its successors and
/// a number of virtual successors equal to the average outdegree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArticleRank {
    average_degree: f64,
}

impl ArticleRank {
    /// Returns the average outdegree computed by
    /// [`prepare`](Variant::prepare).
    pub fn average_degree(&self) -> f64 {
        self.average_degree
    }
}

impl Variant for ArticleRank {
    fn prepare<G: Graph + Sync>(&mut self, graph: &G) {
        self.average_degree = match graph.num_nodes() {
            0 => 0.0,
            n => graph.num_arcs() as f64 / n as f64,
        };
    }

    #[inline]
    fn propagate<G: Graph>(
        &self,
        graph: &G,
        node: usize,
        delta: f64,
        emit: &mut impl FnMut(usize, f32),
    ) {
        let degree = graph.outdegree(node);
        if degree == 0 {
            return;
        }
        let share = (delta / (degree as f64 + self.average_degree)) as f32;
        graph.for_each_successor(node, DEFAULT_WEIGHT, |_, succ, _| {
            emit(succ, share);
            true
        });
    }
}

/// Eigenvector centrality: the delta of a node is pushed unsplit to each
/// successor, incoming contributions are divided by the number of nodes, and
/// deltas are rescaled to unit L2 norm at the end of every iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eigenvector {
    num_nodes: usize,
}

impl Variant for Eigenvector {
    fn prepare<G: Graph + Sync>(&mut self, graph: &G) {
        self.num_nodes = graph.num_nodes();
    }

    fn initial_value(&self, num_nodes: usize, _alpha: f64) -> f64 {
        1.0 / num_nodes.max(1) as f64
    }

    fn degree_factor(&self) -> f64 {
        1.0 / self.num_nodes.max(1) as f64
    }

    #[inline]
    fn propagate<G: Graph>(
        &self,
        graph: &G,
        node: usize,
        delta: f64,
        emit: &mut impl FnMut(usize, f32),
    ) {
        let share = delta as f32;
        graph.for_each_successor(node, DEFAULT_WEIGHT, |_, succ, _| {
            emit(succ, share);
            true
        });
    }

    fn normalize(&self, deltas: &mut [f64], l2_norm: f64) {
        for delta in deltas.iter_mut() {
            *delta /= l2_norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::vec_graph::VecGraph;

    fn shares<V: Variant>(
        variant: &V,
        graph: &VecGraph,
        node: usize,
        delta: f64,
    ) -> Vec<(usize, f32)> {
        let mut out = vec![];
        variant.propagate(graph, node, delta, &mut |succ, share| out.push((succ, share)));
        out
    }

    #[test]
    fn test_standard() {
        let g = VecGraph::from_arcs([(0, 1), (0, 2), (0, 3), (1, 0)]);
        assert_eq!(
            shares(&Standard, &g, 0, 0.3),
            vec![(1, 0.1_f32), (2, 0.1), (3, 0.1)]
        );
        assert!(shares(&Standard, &g, 3, 0.3).is_empty());
    }

    #[test]
    fn test_weighted() {
        let g = VecGraph::from_weighted_arcs([(0, 1, 0.3), (0, 2, 0.7), (0, 3, -0.9), (1, 0, 0.0)]);
        let mut variant = Weighted::default();
        variant.prepare(&g);
        assert!((variant.weight_sums()[0] - 1.0).abs() < 1E-12);
        assert_eq!(&variant.weight_sums()[1..], &[0.0, 0.0, 0.0]);
        let out = shares(&variant, &g, 0, 1.0);
        assert_eq!(out.len(), 2);
        assert!((out[0].1 - 0.3).abs() < 1E-6);
        assert!((out[1].1 - 0.7).abs() < 1E-6);
        assert!(shares(&variant, &g, 1, 1.0).is_empty());

        let g = VecGraph::from_arcs([(0, 1), (0, 2)]);
        let mut variant = Weighted::new(0.0);
        variant.prepare(&g);
        assert!(shares(&variant, &g, 0, 1.0).is_empty());
    }

    #[test]
    fn test_article_rank() {
        // 4 arcs, 4 nodes: average degree 1
        let g = VecGraph::from_arcs([(0, 1), (0, 2), (0, 3), (1, 0)]);
        let mut variant = ArticleRank::default();
        variant.prepare(&g);
        assert_eq!(variant.average_degree(), 1.0);
        assert_eq!(shares(&variant, &g, 0, 1.0), vec![(1, 0.25), (2, 0.25), (3, 0.25)]);
        assert_eq!(shares(&variant, &g, 1, 1.0), vec![(0, 0.5)]);
    }

    #[test]
    fn test_eigenvector() {
        let g = VecGraph::from_arcs([(0, 1), (0, 2), (0, 3), (1, 0)]);
        let mut variant = Eigenvector::default();
        variant.prepare(&g);
        assert_eq!(variant.initial_value(4, 0.15), 0.25);
        assert_eq!(variant.degree_factor(), 0.25);
        assert_eq!(shares(&variant, &g, 0, 0.5), vec![(1, 0.5), (2, 0.5), (3, 0.5)]);
        let mut deltas = [3.0, 4.0];
        variant.normalize(&mut deltas, 5.0);
        assert_eq!(deltas, [0.6, 0.8]);
    }
}
