/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Partition-based parallel PageRank.
//!
//! The node space is split into contiguous partitions of similar accumulated
//! outdegree, and each partition is assigned to a [compute
//! step](super::compute_step::ComputeStep) owning the ranks of its nodes.
//! Ranks are computed by _delta pushing_: at every iteration each node
//! pushes the rank it gained in the previous iteration (its _delta_) to its
//! successors, and the contributions received by a node, multiplied by the
//! damping factor, become its new delta. Initially, every node (or, in the
//! personalized case, every source node) has rank and delta equal to
//! α = 1 − damping factor.
//!
//! If we denote with *P* the row-normalized adjacency matrix of the graph
//! (with zero rows for dangling nodes), with **s** the characteristic vector
//! of the seeded nodes and with *d* the damping factor, the ranks after *t*
//! iterations are
//!
//! > (1 − *d*) **s** ∑_(*k* ≤ *t*) (*d* *P*)*ᵏ*,
//!
//! that is, a truncation of (1 − *d*) **s** (*I* − *d* *P*)⁻¹. The rank of
//! dangling nodes is not redistributed, so the result is not stochastic: on a
//! graph without dangling nodes, ranks sum to (1 − *d*) times the number of
//! seeded nodes.
//!
//! Contributions travel between partitions through single-precision
//! mailboxes, which are exchanged by the
//! [coordinator](super::coordinator::ComputeStepCoordinator) between phases
//! by moving buffers, not copying them. The computation stops after
//! [`max_iterations`](Config::max_iterations) iterations, or as soon as no
//! delta exceeds the [`tolerance`](Config::tolerance).
//!
//! The number of partitions, and thus the number of threads, is bounded by
//! the requested concurrency, which is reduced if the estimated memory usage
//! exceeds the available memory (see
//! [`ConcurrencyPlanner`](super::concurrency::ConcurrencyPlanner)).

use super::compute_step::{ComputeStep, StepParams};
use super::concurrency::ConcurrencyPlanner;
use super::coordinator::ComputeStepCoordinator;
use super::partition::{degree_partition, merge_partitions, Partition};
use super::result::{assemble, PageRankResult};
use super::variant::{Standard, Variant};
use crate::traits::Graph;
use crate::utils::mem::{self, humanize_bytes, AllocationTracker, CostModel};
use dsi_progress_logger::{no_logging, ProgressLog};
use std::sync::atomic::AtomicBool;
use thiserror::Error;

/// Errors of a rank computation.
///
/// Configuration errors are detected before any worker starts.
#[derive(Error, Debug)]
pub enum PageRankError {
    #[error("The maximum number of iterations must be at least one, got {0}")]
    InvalidMaxIterations(usize),
    #[error("The damping factor must be in [0 . . 1), got {0}")]
    InvalidDampingFactor(f64),
    #[error("The tolerance must be nonnegative, got {0}")]
    InvalidTolerance(f64),
    /// The stop flag was set; partial results are discarded.
    #[error("The computation was interrupted after {iterations} iterations")]
    Interrupted { iterations: usize },
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// The configuration of a rank computation.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub damping_factor: f64,
    /// A step is stable when none of its deltas exceeds this value.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Original identifiers of the seed nodes; if empty, all nodes are
    /// seeded.
    pub source_nodes: Vec<u64>,
    /// The requested number of threads, and the maximum number of
    /// partitions.
    pub concurrency: usize,
    /// The number of nodes of average outdegree in a fine-grained partition;
    /// zero means no bound.
    pub batch_size: usize,
    /// The memory available for the computation; if `None`, the memory
    /// available to the process is used.
    pub available_memory: Option<u64>,
}

impl Config {
    pub const DEFAULT_DAMPING_FACTOR: f64 = 0.85;
    pub const DEFAULT_TOLERANCE: f64 = 1E-7;
    pub const DEFAULT_MAX_ITERATIONS: usize = 20;

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), PageRankError> {
        if self.max_iterations < 1 {
            return Err(PageRankError::InvalidMaxIterations(self.max_iterations));
        }
        // Note that 0.0..1.0 is [0.0..1.0) in mathematical notation
        if !(0.0..1.0).contains(&self.damping_factor) {
            return Err(PageRankError::InvalidDampingFactor(self.damping_factor));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(PageRankError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            damping_factor: Self::DEFAULT_DAMPING_FACTOR,
            tolerance: Self::DEFAULT_TOLERANCE,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            source_nodes: Vec::new(),
            concurrency: num_cpus::get(),
            batch_size: 0,
            available_memory: None,
        }
    }
}

/// Computes PageRank (or another [variant](Variant)) on a partitioned node
/// space.
///
/// The struct is configured via setters and then executed via
/// [`run`](Self::run). Since every worker obtains its own
/// [concurrent copy](Graph::concurrent_copy) of the graph, it is usually
/// convenient to pass a reference.
///
/// # Examples
///
/// ```
/// use partition_rank::graphs::vec_graph::VecGraph;
/// use partition_rank::rank::PageRank;
///
/// let graph = VecGraph::from_arcs([(0, 1), (1, 2), (2, 0)]);
/// let mut pr = PageRank::new(&graph);
/// pr.damping_factor(0.85).tolerance(1E-3).concurrency(2);
/// let result = pr.run().unwrap();
///
/// assert!(result.did_converge());
/// assert!((result.score(0) - result.score(1)).abs() < 1E-6);
/// ```
///
/// Personalized weighted PageRank:
///
/// ```
/// use partition_rank::graphs::vec_graph::VecGraph;
/// use partition_rank::rank::{PageRank, variant::Weighted};
///
/// let graph = VecGraph::from_weighted_arcs([(0, 1, 1.0), (0, 2, 3.0), (1, 0, 1.0), (2, 0, 1.0)]);
/// let mut pr = PageRank::with_variant(&graph, Weighted::default());
/// pr.source_nodes([0]).max_iterations(40);
/// let result = pr.run().unwrap();
///
/// assert!(result.score(2) > result.score(1));
/// ```
pub struct PageRank<'a, G: Graph + Send + Sync, V: Variant = Standard> {
    graph: G,
    variant: V,
    config: Config,
    cost_model: CostModel,
    stop: Option<&'a AtomicBool>,
    tracker: AllocationTracker,
}

impl<G: Graph + Send + Sync, V: Variant + core::fmt::Debug> core::fmt::Debug
    for PageRank<'_, G, V>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageRank")
            .field("variant", &self.variant)
            .field("config", &self.config)
            .field("cost_model", &self.cost_model)
            .finish_non_exhaustive()
    }
}

impl<G: Graph + Send + Sync> PageRank<'_, G, Standard> {
    /// Creates a new standard PageRank computation with the default
    /// configuration.
    pub fn new(graph: G) -> Self {
        Self::with_variant(graph, Standard)
    }
}

impl<'a, G: Graph + Send + Sync, V: Variant> PageRank<'a, G, V> {
    /// Creates a new computation of the given variant with the default
    /// configuration.
    pub fn with_variant(graph: G, variant: V) -> Self {
        Self {
            graph,
            variant,
            config: Config::default(),
            cost_model: CostModel::DEFAULT,
            stop: None,
            tracker: AllocationTracker::new(),
        }
    }

    /// Sets the damping factor, which must be in [0 . . 1).
    pub fn damping_factor(&mut self, damping_factor: f64) -> &mut Self {
        self.config.damping_factor = damping_factor;
        self
    }

    /// Sets the tolerance, which must be nonnegative.
    pub fn tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of iterations, which must be positive.
    pub fn max_iterations(&mut self, max_iterations: usize) -> &mut Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Sets the original identifiers of the seed nodes.
    ///
    /// Identifiers that cannot be mapped to a node are ignored. If no
    /// identifier is given, or none can be mapped, all nodes are seeded.
    pub fn source_nodes(&mut self, source_nodes: impl IntoIterator<Item = u64>) -> &mut Self {
        self.config.source_nodes = source_nodes.into_iter().collect();
        self
    }

    /// Sets the requested number of threads.
    pub fn concurrency(&mut self, concurrency: usize) -> &mut Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Sets the size of fine-grained partitions, in nodes of average
    /// outdegree.
    pub fn batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Sets the memory available for the computation.
    pub fn available_memory(&mut self, available_memory: Option<u64>) -> &mut Self {
        self.config.available_memory = available_memory;
        self
    }

    /// Sets the cost model used for memory estimates and accounting.
    pub fn cost_model(&mut self, cost_model: CostModel) -> &mut Self {
        self.cost_model = cost_model;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    /// Sets a flag that interrupts the computation when set.
    pub fn stop_flag(&mut self, stop: Option<&'a AtomicBool>) -> &mut Self {
        self.stop = stop;
        self
    }

    /// Returns the current configuration.
    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Returns the variant, which after a run holds the data computed by
    /// [`prepare`](Variant::prepare).
    pub fn variant(&self) -> &V {
        &self.variant
    }

    /// Returns the tracker of the memory allocated by the computation.
    ///
    /// All memory is released by the end of [`run`](Self::run), so outside
    /// of it the tracker reports zero.
    pub fn tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    /// Runs the computation.
    pub fn run(&mut self) -> Result<PageRankResult, PageRankError> {
        self.run_with_logging(no_logging![])
    }

    /// Runs the computation, logging progress.
    ///
    /// `pl` is updated once per completed phase (initialization, and three
    /// phases per iteration).
    pub fn run_with_logging(
        &mut self,
        pl: &mut impl ProgressLog,
    ) -> Result<PageRankResult, PageRankError> {
        self.config.validate()?;

        let num_nodes = self.graph.num_nodes();
        log::info!("Damping factor: {}", self.config.damping_factor);
        log::info!("Tolerance: {}", self.config.tolerance);
        log::info!("Maximum number of iterations: {}", self.config.max_iterations);

        if num_nodes == 0 {
            return Ok(PageRankResult::new(Box::default(), 0, true));
        }

        let source_nodes = self.mapped_source_nodes();

        let partitions = degree_partition(&self.graph, self.config.batch_size);
        let available_memory = self
            .config
            .available_memory
            .unwrap_or_else(mem::available_memory);
        log::info!("Available memory: {}", humanize_bytes(available_memory));
        let concurrency = ConcurrencyPlanner::new(available_memory)
            .cost_model(self.cost_model)
            .throttle(self.config.concurrency, &partitions);
        let partitions = merge_partitions(partitions, concurrency);
        log::info!(
            "Using {} partitions with concurrency {concurrency}",
            partitions.len()
        );
        for partition in &partitions {
            log::debug!("Partition {partition}");
        }

        // one thread per step
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(partitions.len())
            .build()?;

        let graph = &self.graph;
        let variant = &mut self.variant;
        thread_pool.install(|| variant.prepare(graph));

        let starts: Vec<usize> = partitions.iter().map(Partition::start_node).collect();
        let lengths: Vec<usize> = partitions.iter().map(Partition::node_count).collect();
        let params = StepParams {
            starts: &starts,
            lengths: &lengths,
            damping_factor: self.config.damping_factor,
            tolerance: self.config.tolerance,
            source_nodes: &source_nodes,
            cost_model: self.cost_model,
        };
        let steps = partitions
            .iter()
            .map(|&partition| {
                ComputeStep::new(
                    self.graph.concurrent_copy(),
                    &self.variant,
                    &self.tracker,
                    params,
                    partition,
                )
            })
            .collect();

        let mut coordinator =
            ComputeStepCoordinator::new(steps, &thread_pool, &self.tracker, &self.cost_model);
        coordinator.stop_flag(self.stop);

        match coordinator.run(self.config.max_iterations, pl) {
            Ok(()) => {
                let result = assemble(coordinator, num_nodes);
                log::info!(
                    "Completed after {} iteration(s), {}converged",
                    result.iterations(),
                    if result.did_converge() { "" } else { "not " }
                );
                Ok(result)
            }
            Err(err) => {
                coordinator.release();
                Err(err)
            }
        }
    }

    /// Maps the configured source nodes, discarding unknown identifiers, and
    /// returns them sorted and deduplicated.
    fn mapped_source_nodes(&self) -> Vec<usize> {
        let requested = &self.config.source_nodes;
        let mut mapped: Vec<usize> = requested
            .iter()
            .filter_map(|&id| self.graph.to_mapped_node_id(id))
            .collect();
        mapped.sort_unstable();
        mapped.dedup();

        if !requested.is_empty() {
            log::info!(
                "Personalized computation: {} of {} source nodes mapped",
                mapped.len(),
                requested.len()
            );
            if mapped.is_empty() {
                log::warn!("No source node could be mapped: seeding all nodes");
            }
        }
        mapped
    }
}
