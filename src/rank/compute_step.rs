/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The per-partition worker of the engine.
//!
//! A [`ComputeStep`] owns the rank and delta values of the nodes of its
//! partition, and one outgoing mailbox per partition (sized to the
//! destination partition). Each call to [`run`](ComputeStep::run) executes
//! exactly one transition of the state machine
//!
//! > [`Init`](State::Init) → [`Calc`](State::Calc) → [`Sync`](State::Sync) →
//! > [`Norm`](State::Norm) → [`Calc`](State::Calc) → …
//!
//! During [`Calc`](State::Calc) a step writes only into its own outgoing
//! mailboxes; during [`Sync`](State::Sync) it reads and zeroes only the
//! incoming mailboxes the coordinator handed to it. No two steps ever touch
//! the same memory within a phase.

use super::partition::Partition;
use super::variant::Variant;
use crate::traits::Graph;
use crate::utils::mem::{AllocationTracker, CostModel};

/// The state of a [`ComputeStep`], that is, the phase it will execute at the
/// next call to [`run`](ComputeStep::run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Allocate mailboxes and seed rank and deltas.
    #[default]
    Init,
    /// Push deltas into the outgoing mailboxes.
    Calc,
    /// Combine the incoming mailboxes into new deltas.
    Sync,
    /// Rescale deltas using the global L2 norm.
    Norm,
}

impl State {
    /// Returns the state following this one.
    #[inline(always)]
    pub fn next(self) -> Self {
        match self {
            State::Init | State::Norm => State::Calc,
            State::Calc => State::Sync,
            State::Sync => State::Norm,
        }
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            State::Init => f.write_str("init"),
            State::Calc => f.write_str("calc"),
            State::Sync => f.write_str("sync"),
            State::Norm => f.write_str("norm"),
        }
    }
}

/// The read-only parameters shared by all steps of a computation.
#[derive(Debug, Clone, Copy)]
pub struct StepParams<'a> {
    /// The start node of every partition, in increasing order.
    pub starts: &'a [usize],
    /// The node count of every partition.
    pub lengths: &'a [usize],
    pub damping_factor: f64,
    pub tolerance: f64,
    /// Sorted, deduplicated seed nodes; empty means all nodes are seeded.
    pub source_nodes: &'a [usize],
    pub cost_model: CostModel,
}

/// A worker computing ranks for the nodes of a single partition.
pub struct ComputeStep<'a, G: Graph, V: Variant> {
    state: State,
    graph: G,
    variant: &'a V,
    tracker: &'a AllocationTracker,
    params: StepParams<'a>,
    partition: Partition,
    num_nodes: usize,

    rank: Box<[f64]>,
    deltas: Box<[f64]>,
    next_scores: Vec<Box<[f32]>>,
    stable: bool,
    l2_norm: f64,
    allocated: u64,
}

impl<G: Graph, V: Variant> core::fmt::Debug for ComputeStep<'_, G, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputeStep")
            .field("state", &self.state)
            .field("partition", &self.partition)
            .field("stable", &self.stable)
            .field("l2_norm", &self.l2_norm)
            .finish_non_exhaustive()
    }
}

impl<'a, G: Graph, V: Variant> ComputeStep<'a, G, V> {
    /// Creates a step for `partition`.
    ///
    /// `graph` should be a [concurrent copy](Graph::concurrent_copy) owned
    /// by this step. No memory is allocated before the
    /// [`Init`](State::Init) phase.
    pub fn new(
        graph: G,
        variant: &'a V,
        tracker: &'a AllocationTracker,
        params: StepParams<'a>,
        partition: Partition,
    ) -> Self {
        let num_nodes = graph.num_nodes();
        Self {
            state: State::Init,
            graph,
            variant,
            tracker,
            params,
            partition,
            num_nodes,
            rank: Box::default(),
            deltas: Box::default(),
            next_scores: Vec::new(),
            stable: false,
            l2_norm: 1.0,
            allocated: 0,
        }
    }

    /// Executes the phase corresponding to the current state and moves to
    /// the next state.
    ///
    /// `incoming` contains the mailboxes sent to this step by every step
    /// (including itself), and is read only in the [`Sync`](State::Sync)
    /// phase, in which it is also zeroed.
    pub fn run(&mut self, incoming: &mut [Box<[f32]>]) {
        match self.state {
            State::Init => self.initialize(),
            State::Calc => self.single_iteration(),
            State::Sync => self.combine_scores(incoming),
            State::Norm => self.normalize_deltas(),
        }
        self.state = self.state.next();
    }

    fn initialize(&mut self) {
        let model = &self.params.cost_model;
        let len = self.partition.node_count();
        let start = self.partition.start_node();

        self.next_scores = self
            .params
            .lengths
            .iter()
            .map(|&l| vec![0.0_f32; l].into_boxed_slice())
            .collect();
        self.rank = vec![0.0; len].into_boxed_slice();
        self.deltas = vec![0.0; len].into_boxed_slice();

        self.allocated = self
            .params
            .lengths
            .iter()
            .map(|&l| model.float_array(l))
            .sum::<u64>()
            + 2 * model.double_array(len);
        self.tracker.add(self.allocated);

        let alpha = 1.0 - self.params.damping_factor;
        let initial_value = self.variant.initial_value(self.num_nodes, alpha);
        let sources = self.params.source_nodes;
        if sources.is_empty() {
            self.rank.fill(initial_value);
            self.deltas.fill(initial_value);
        } else {
            let first = sources.partition_point(|&s| s < start);
            let last = sources.partition_point(|&s| s < self.partition.end_node());
            for &node in &sources[first..last] {
                self.rank[node - start] = initial_value;
                self.deltas[node - start] = initial_value;
            }
        }
    }

    fn single_iteration(&mut self) {
        let starts = self.params.starts;
        let next_scores = &mut self.next_scores;
        let mut emit = |target: usize, share: f32| {
            let dest = starts.partition_point(|&s| s <= target) - 1;
            next_scores[dest][target - starts[dest]] += share;
        };

        for (node, &delta) in self.partition.nodes().zip(self.deltas.iter()) {
            if delta > 0.0 {
                self.variant.propagate(&self.graph, node, delta, &mut emit);
            }
        }
    }

    fn combine_scores(&mut self, incoming: &mut [Box<[f32]>]) {
        self.deltas.fill(0.0);
        for buffer in incoming.iter_mut() {
            for (sum, score) in self.deltas.iter_mut().zip(buffer.iter_mut()) {
                *sum += *score as f64;
                *score = 0.0;
            }
        }

        let factor = self.params.damping_factor * self.variant.degree_factor();
        let tolerance = self.params.tolerance;
        let mut stable = true;
        for (rank, delta) in self.rank.iter_mut().zip(self.deltas.iter_mut()) {
            *delta *= factor;
            if *delta > tolerance {
                stable = false;
            }
            *rank += *delta;
        }
        self.stable = stable;
    }

    fn normalize_deltas(&mut self) {
        self.variant.normalize(&mut self.deltas, self.l2_norm);
    }

    /// Returns the state of the step.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the partition of the step.
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Returns whether no delta exceeded the tolerance in the last
    /// [`Sync`](State::Sync) phase.
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    /// Sets the global L2 norm used by the next [`Norm`](State::Norm) phase.
    pub fn set_l2_norm(&mut self, l2_norm: f64) {
        self.l2_norm = l2_norm;
    }

    /// Returns the accumulated ranks of the nodes of the partition.
    pub fn rank(&self) -> &[f64] {
        &self.rank
    }

    /// Returns the deltas of the nodes of the partition.
    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    /// Returns the outgoing mailboxes, indexed by destination step.
    ///
    /// Between a [`Calc`](State::Calc) phase and the exchange, a mailbox may
    /// be temporarily empty because it has been moved to the coordinator.
    pub fn next_scores(&self) -> &[Box<[f32]>] {
        &self.next_scores
    }

    pub(crate) fn next_scores_mut(&mut self) -> &mut [Box<[f32]>] {
        &mut self.next_scores
    }

    /// Frees the mailboxes and the delta array, and returns the accumulated
    /// ranks.
    ///
    /// The memory reported to the tracker at initialization is removed.
    pub fn release(&mut self) -> Box<[f64]> {
        self.tracker.remove(self.allocated);
        self.allocated = 0;
        self.next_scores = Vec::new();
        self.deltas = Box::default();
        core::mem::take(&mut self.rank)
    }
}

impl<G: Graph, V: Variant> Drop for ComputeStep<'_, G, V> {
    fn drop(&mut self) {
        if self.allocated != 0 {
            self.tracker.remove(self.allocated);
        }
    }
}
