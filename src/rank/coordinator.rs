/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Barrier-synchronized orchestration of the compute steps.
//!
//! The [`ComputeStepCoordinator`] runs every phase of the computation by
//! handing all steps to a Rayon thread pool and waiting for all of them to
//! complete. Between phases, while no step is running, it performs the only
//! operations touching more than one step:
//!
//! - the exchange ([`synchronize_scores`](ComputeStepCoordinator::synchronize_scores)),
//!   which moves the outgoing mailbox `j` of step `i` into the slot `[j][i]`
//!   of the score matrix, so that row `j` gathers everything sent to step
//!   `j`; after the [`Sync`](super::compute_step::State::Sync) phase the
//!   (zeroed) buffers are moved back to their owners;
//! - the convergence check, that is, the logical and of the stability flags
//!   of all steps;
//! - the computation of the global L2 norm of the deltas.
//!
//! Buffers are moved, never copied or aliased.

use super::compute_step::ComputeStep;
use super::pagerank::PageRankError;
use super::variant::Variant;
use crate::traits::Graph;
use crate::utils::mem::{AllocationTracker, CostModel};
use dsi_progress_logger::ProgressLog;
use kahan::KahanSum;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Drives the phases of a set of [`ComputeStep`]s.
pub struct ComputeStepCoordinator<'a, G: Graph, V: Variant> {
    steps: Vec<ComputeStep<'a, G, V>>,
    /// Indexed by `[destination][source]`.
    scores: Vec<Vec<Box<[f32]>>>,
    thread_pool: &'a rayon::ThreadPool,
    tracker: &'a AllocationTracker,
    matrix_bytes: u64,
    stop: Option<&'a AtomicBool>,
    ran_iterations: usize,
    did_converge: bool,
}

impl<G: Graph, V: Variant> core::fmt::Debug for ComputeStepCoordinator<'_, G, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputeStepCoordinator")
            .field("steps", &self.steps.len())
            .field("ran_iterations", &self.ran_iterations)
            .field("did_converge", &self.did_converge)
            .finish_non_exhaustive()
    }
}

impl<'a, G: Graph + Send + Sync, V: Variant> ComputeStepCoordinator<'a, G, V> {
    /// Creates a coordinator for the given steps, which must be ordered by
    /// partition.
    ///
    /// The score matrix is reported to `tracker` and removed by
    /// [`release`](Self::release).
    pub fn new(
        steps: Vec<ComputeStep<'a, G, V>>,
        thread_pool: &'a rayon::ThreadPool,
        tracker: &'a AllocationTracker,
        cost_model: &CostModel,
    ) -> Self {
        let num_steps = steps.len();
        let scores = (0..num_steps)
            .map(|_| (0..num_steps).map(|_| Box::default()).collect())
            .collect();
        let matrix_bytes = (num_steps as u64 + 1) * cost_model.reference_array(num_steps);
        tracker.add(matrix_bytes);
        Self {
            steps,
            scores,
            thread_pool,
            tracker,
            matrix_bytes,
            stop: None,
            ran_iterations: 0,
            did_converge: false,
        }
    }

    /// Sets a flag that, when set, stops the computation before the next
    /// phase.
    pub fn stop_flag(&mut self, stop: Option<&'a AtomicBool>) -> &mut Self {
        self.stop = stop;
        self
    }

    /// Runs the initialization phase and then at most `max_iterations`
    /// iterations, each made of a calc, a sync and a norm phase, stopping
    /// early when all steps are stable.
    ///
    /// `pl` is updated once per completed phase.
    pub fn run(
        &mut self,
        max_iterations: usize,
        pl: &mut impl ProgressLog,
    ) -> Result<(), PageRankError> {
        self.ran_iterations = 0;
        self.did_converge = false;

        pl.item_name("phase");
        pl.expected_updates(Some(1 + 3 * max_iterations));
        pl.start(format!(
            "Computing ranks on {} partitions...",
            self.steps.len()
        ));

        self.check_stop()?;
        self.run_and_join();
        pl.update();

        while self.ran_iterations < max_iterations && !self.did_converge {
            self.check_stop()?;
            self.run_and_join();
            pl.update();

            self.synchronize_scores();
            self.check_stop()?;
            self.run_and_join();
            self.return_scores();
            pl.update();
            self.did_converge = self.check_tolerance();

            let l2_norm = self.compute_norm();
            for step in &mut self.steps {
                step.set_l2_norm(l2_norm);
            }
            self.check_stop()?;
            self.run_and_join();
            pl.update();

            self.ran_iterations += 1;
            log::info!(
                "Iteration {}: L2 norm of deltas = {l2_norm}{}",
                self.ran_iterations,
                if self.did_converge { ", converged" } else { "" }
            );
        }

        pl.done();
        Ok(())
    }

    fn check_stop(&self) -> Result<(), PageRankError> {
        match self.stop {
            Some(stop) if stop.load(Ordering::Relaxed) => {
                log::warn!(
                    "Computation interrupted after {} iterations",
                    self.ran_iterations
                );
                Err(PageRankError::Interrupted {
                    iterations: self.ran_iterations,
                })
            }
            _ => Ok(()),
        }
    }

    /// Runs the next phase of every step in the thread pool, and returns
    /// when all steps have completed it.
    pub(crate) fn run_and_join(&mut self) {
        let steps = &mut self.steps;
        let scores = &mut self.scores;
        self.thread_pool.install(|| {
            steps
                .par_iter_mut()
                .zip(scores.par_iter_mut())
                .with_max_len(1)
                .for_each(|(step, incoming)| step.run(incoming));
        });
    }

    /// Moves the outgoing mailbox `j` of every step `i` into
    /// `scores[j][i]`.
    pub fn synchronize_scores(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            for (j, buffer) in step.next_scores_mut().iter_mut().enumerate() {
                self.scores[j][i] = core::mem::take(buffer);
            }
        }
    }

    /// Moves every `scores[j][i]` back to the outgoing mailbox `j` of step
    /// `i`.
    fn return_scores(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            for (j, buffer) in step.next_scores_mut().iter_mut().enumerate() {
                *buffer = core::mem::take(&mut self.scores[j][i]);
            }
        }
    }

    /// Returns whether all steps are stable.
    pub fn check_tolerance(&self) -> bool {
        self.steps.iter().all(ComputeStep::is_stable)
    }

    /// Returns the L2 norm of the deltas of all steps, or one if the norm
    /// is not positive.
    pub fn compute_norm(&self) -> f64 {
        let steps = &self.steps;
        let sum_of_squares: f64 = self.thread_pool.install(|| {
            steps
                .par_iter()
                .map(|step| {
                    let mut sum = KahanSum::new();
                    for &delta in step.deltas() {
                        sum += delta * delta;
                    }
                    sum.sum()
                })
                .sum()
        });
        let l2_norm = sum_of_squares.sqrt();
        // also catches NaN
        if l2_norm > 0.0 {
            l2_norm
        } else {
            1.0
        }
    }

    /// Returns the steps.
    pub fn steps(&self) -> &[ComputeStep<'a, G, V>] {
        &self.steps
    }

    /// Returns the score matrix, indexed by `[destination][source]`.
    pub fn scores(&self) -> &[Vec<Box<[f32]>>] {
        &self.scores
    }

    pub fn thread_pool(&self) -> &rayon::ThreadPool {
        self.thread_pool
    }

    /// Returns the number of iterations run by the last call to
    /// [`run`](Self::run).
    pub fn iterations(&self) -> usize {
        self.ran_iterations
    }

    /// Returns whether all steps were stable at the end of the last
    /// iteration.
    pub fn did_converge(&self) -> bool {
        self.did_converge
    }

    /// Releases the score matrix and all steps.
    pub fn release(&mut self) {
        for step in &mut self.steps {
            step.release();
        }
        self.steps.clear();
        self.scores = Vec::new();
        self.tracker.remove(self.matrix_bytes);
        self.matrix_bytes = 0;
        log::debug!("Released score matrix and compute steps");
    }
}

impl<G: Graph, V: Variant> Drop for ComputeStepCoordinator<'_, G, V> {
    fn drop(&mut self) {
        self.tracker.remove(self.matrix_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::vec_graph::VecGraph;
    use crate::rank::compute_step::{State, StepParams};
    use crate::rank::partition::Partition;
    use crate::rank::variant::Standard;
    use dsi_progress_logger::no_logging;

    fn pool(num_threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .unwrap()
    }

    fn params<'a>(
        starts: &'a [usize],
        lengths: &'a [usize],
        damping_factor: f64,
    ) -> StepParams<'a> {
        StepParams {
            starts,
            lengths,
            damping_factor,
            tolerance: 1E-7,
            source_nodes: &[],
            cost_model: CostModel::DEFAULT,
        }
    }

    fn coordinator<'a>(
        g: &'a VecGraph,
        partitions: &[Partition],
        params: StepParams<'a>,
        tracker: &'a AllocationTracker,
        thread_pool: &'a rayon::ThreadPool,
    ) -> ComputeStepCoordinator<'a, &'a VecGraph, Standard> {
        let steps = partitions
            .iter()
            .map(|&p| ComputeStep::new(g, &Standard, tracker, params, p))
            .collect();
        ComputeStepCoordinator::new(steps, thread_pool, tracker, &CostModel::DEFAULT)
    }

    #[test]
    fn test_exchange_moves_buffers() {
        let g = VecGraph::from_arcs([(0, 3), (1, 4), (2, 0), (3, 1), (4, 2), (5, 5)]);
        let partitions = [Partition::new(0, 2), Partition::new(2, 3), Partition::new(5, 1)];
        let starts: Vec<_> = partitions.iter().map(Partition::start_node).collect();
        let lengths: Vec<_> = partitions.iter().map(Partition::node_count).collect();
        let tracker = AllocationTracker::new();
        let thread_pool = pool(2);
        let mut coordinator = coordinator(
            &g,
            &partitions,
            params(&starts, &lengths, 0.85),
            &tracker,
            &thread_pool,
        );

        coordinator.run_and_join();
        coordinator.run_and_join();
        assert!(coordinator.steps().iter().all(|s| s.state() == State::Sync));

        let before: Vec<Vec<(*const f32, Vec<f32>)>> = coordinator
            .steps()
            .iter()
            .map(|s| {
                s.next_scores()
                    .iter()
                    .map(|b| (b.as_ptr(), b.to_vec()))
                    .collect()
            })
            .collect();

        coordinator.synchronize_scores();

        for (i, row) in before.iter().enumerate() {
            for (j, (ptr, values)) in row.iter().enumerate() {
                let moved = &coordinator.scores()[j][i];
                assert_eq!(moved.as_ptr(), *ptr);
                assert_eq!(moved.len(), lengths[j]);
                assert_eq!(&moved[..], &values[..]);
            }
            assert!(coordinator.steps()[i]
                .next_scores()
                .iter()
                .all(|b| b.is_empty()));
        }

        coordinator.run_and_join();
        coordinator.return_scores();
        for (i, row) in before.iter().enumerate() {
            for (j, (ptr, _)) in row.iter().enumerate() {
                let buffer = &coordinator.steps()[i].next_scores()[j];
                assert_eq!(buffer.as_ptr(), *ptr);
                assert!(buffer.iter().all(|&s| s == 0.0));
            }
        }
        assert!(coordinator.scores().iter().flatten().all(|b| b.is_empty()));

        coordinator.release();
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_norm_and_tolerance() {
        let g = VecGraph::empty(4);
        let partitions = [Partition::new(0, 2), Partition::new(2, 2)];
        let starts = [0, 2];
        let lengths = [2, 2];
        let tracker = AllocationTracker::new();
        let thread_pool = pool(2);

        let mut c = coordinator(
            &g,
            &partitions,
            params(&starts, &lengths, 0.5),
            &tracker,
            &thread_pool,
        );
        c.run_and_join();
        // four deltas equal to 0.5
        assert!((c.compute_norm() - 1.0).abs() < 1E-12);
        assert!(!c.check_tolerance());
        c.release();

        let mut c = coordinator(
            &g,
            &partitions,
            params(&starts, &lengths, 0.5),
            &tracker,
            &thread_pool,
        );
        c.run(10, no_logging![]).unwrap();
        assert_eq!(c.iterations(), 1);
        assert!(c.did_converge());
        // all deltas are now zero
        assert_eq!(c.compute_norm(), 1.0);
        drop(c);
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_interrupted() {
        let g = VecGraph::from_arcs([(0, 1), (1, 0)]);
        let tracker = AllocationTracker::new();
        let thread_pool = pool(1);
        let stop = AtomicBool::new(true);
        let mut c = coordinator(
            &g,
            &[Partition::new(0, 2)],
            params(&[0], &[2], 0.85),
            &tracker,
            &thread_pool,
        );
        c.stop_flag(Some(&stop));
        assert!(matches!(
            c.run(10, no_logging![]),
            Err(PageRankError::Interrupted { iterations: 0 })
        ));
        c.release();
        assert_eq!(tracker.tracked(), 0);
    }
}
