/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Memory-aware throttling of the number of workers.
//!
//! The memory needed by a computation with a given concurrency is estimated
//! from the partitions the computation would use: every worker owns two
//! arrays of doubles (rank and deltas) as large as its partition plus two
//! arrays of buffer pointers, and the coordinator owns a square matrix of
//! buffer pointers. If the estimate for the requested concurrency exceeds
//! the available memory, the concurrency is reduced until the estimate
//! fits, or until it reaches one. Throttling is logged, but never fails.

use super::partition::{merge_partitions, Partition};
use crate::utils::mem::{humanize_bytes, CostModel};

/// Number of word-sized fields of a worker, used for its fixed overhead.
const STEP_FIELDS: usize = 24;

/// Returns the estimated memory used by a worker on a partition with
/// `node_count` nodes, in a computation with `num_steps` workers.
pub fn step_memory(model: &CostModel, node_count: usize, num_steps: usize) -> u64 {
    model.instance(STEP_FIELDS)
        + 2 * model.double_array(node_count)
        + 2 * model.reference_array(num_steps)
}

/// Returns the estimated memory of the structures shared by `num_steps`
/// workers: the score matrix, and the partition start and length arrays.
pub fn shared_memory(model: &CostModel, num_steps: usize) -> u64 {
    (num_steps as u64 + 1) * model.reference_array(num_steps) + 2 * model.index_array(num_steps)
}

/// Returns the estimated memory used by a computation on the given
/// (unmerged) partitions with the given concurrency.
pub fn estimate_memory(model: &CostModel, partitions: &[Partition], concurrency: usize) -> u64 {
    let merged = merge_partitions(partitions.to_vec(), concurrency);
    let num_steps = merged.len();
    merged
        .iter()
        .map(|p| step_memory(model, p.node_count(), num_steps))
        .sum::<u64>()
        + shared_memory(model, num_steps)
}

/// Plans the number of workers given the available memory.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyPlanner {
    model: CostModel,
    available_memory: u64,
}

impl ConcurrencyPlanner {
    pub fn new(available_memory: u64) -> Self {
        Self {
            model: CostModel::DEFAULT,
            available_memory,
        }
    }

    /// Sets the cost model used for estimates.
    pub fn cost_model(mut self, model: CostModel) -> Self {
        self.model = model;
        self
    }

    /// Returns the largest concurrency not exceeding `requested` (nor the
    /// number of partitions) whose estimated memory fits in the available
    /// memory, or one if no such concurrency exists.
    ///
    /// At each round the concurrency is reduced by the number of workers
    /// whose average cost covers the overflow.
    pub fn throttle(&self, requested: usize, partitions: &[Partition]) -> usize {
        let requested = requested.min(partitions.len()).max(1);
        let mut concurrency = requested;
        let mut usage = estimate_memory(&self.model, partitions, concurrency);
        let required = usage;

        while concurrency > 1 && usage > self.available_memory {
            let overflow = usage - self.available_memory;
            let per_thread = (usage / concurrency as u64).max(1);
            let reduction = overflow.div_ceil(per_thread).max(1);
            concurrency = concurrency
                .saturating_sub(usize::try_from(reduction).unwrap_or(usize::MAX))
                .max(1);
            usage = estimate_memory(&self.model, partitions, concurrency);
        }

        if concurrency < requested {
            log::warn!(
                "Requested concurrency {requested} needs {} of memory, but only {} are available: using concurrency {concurrency} ({})",
                humanize_bytes(required),
                humanize_bytes(self.available_memory),
                humanize_bytes(usage),
            );
        }

        concurrency
    }
}
