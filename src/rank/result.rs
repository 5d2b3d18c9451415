/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Assembly and post-processing of the final rank vector.

use super::coordinator::ComputeStepCoordinator;
use super::variant::Variant;
use crate::traits::Graph;
use rayon::prelude::*;

/// Post-hoc scaling of a rank vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Leaves the vector unchanged.
    #[default]
    None,
    /// Divides by the maximum value.
    Max,
    /// Divides by the sum of absolute values.
    L1Norm,
    /// Divides by the Euclidean norm.
    L2Norm,
}

impl core::fmt::Display for Normalization {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Normalization::None => f.write_str("none"),
            Normalization::Max => f.write_str("max"),
            Normalization::L1Norm => f.write_str("L1 norm"),
            Normalization::L2Norm => f.write_str("L2 norm"),
        }
    }
}

impl Normalization {
    /// Scales `scores` in place. A zero (or non-finite) divisor leaves the
    /// scores unchanged.
    pub fn apply(self, scores: &mut [f64]) {
        let divisor = match self {
            Normalization::None => return,
            Normalization::Max => scores.par_iter().copied().reduce(|| f64::MIN, f64::max),
            Normalization::L1Norm => scores.par_iter().map(|x| x.abs()).sum::<f64>(),
            Normalization::L2Norm => scores.par_iter().map(|x| x * x).sum::<f64>().sqrt(),
        };
        if divisor == 0.0 || !divisor.is_finite() {
            return;
        }
        scores.par_iter_mut().for_each(|x| *x /= divisor);
    }
}

/// The outcome of a rank computation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRankResult {
    scores: Box<[f64]>,
    iterations: usize,
    did_converge: bool,
}

impl PageRankResult {
    pub fn new(scores: Box<[f64]>, iterations: usize, did_converge: bool) -> Self {
        Self {
            scores,
            iterations,
            did_converge,
        }
    }

    /// Returns the score of every node.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Returns the score of a node.
    pub fn score(&self, node: usize) -> f64 {
        self.scores[node]
    }

    /// Returns the number of iterations that were run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns whether the computation stopped because all deltas were
    /// within tolerance.
    pub fn did_converge(&self) -> bool {
        self.did_converge
    }

    /// Returns the result with its scores scaled by `normalization`.
    pub fn normalized(mut self, normalization: Normalization) -> Self {
        normalization.apply(&mut self.scores);
        self
    }
}

/// Copies the ranks of every step into a vector of `num_nodes` scores, and
/// then releases the steps and the score matrix of the coordinator.
///
/// The partitions of the steps must be ordered and cover all nodes.
pub fn assemble<G: Graph + Send + Sync, V: Variant>(
    mut coordinator: ComputeStepCoordinator<'_, G, V>,
    num_nodes: usize,
) -> PageRankResult {
    let mut scores = vec![0.0; num_nodes].into_boxed_slice();

    let mut rest = &mut scores[..];
    let mut slices = Vec::with_capacity(coordinator.steps().len());
    for step in coordinator.steps() {
        debug_assert_eq!(step.rank().len(), step.partition().node_count());
        let (slice, tail) = core::mem::take(&mut rest).split_at_mut(step.partition().node_count());
        slices.push(slice);
        rest = tail;
    }
    debug_assert!(rest.is_empty());

    coordinator.thread_pool().install(|| {
        slices
            .into_par_iter()
            .zip(coordinator.steps().par_iter())
            .for_each(|(slice, step)| slice.copy_from_slice(step.rank()));
    });

    let result = PageRankResult::new(
        scores,
        coordinator.iterations(),
        coordinator.did_converge(),
    );
    coordinator.release();
    result
}
