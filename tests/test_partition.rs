/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use partition_rank::prelude::*;
use partition_rank::rank::concurrency::{estimate_memory, ConcurrencyPlanner};
use partition_rank::rank::partition::{degree_partition, merge_partitions, Partition};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn check_coverage(partitions: &[Partition], num_nodes: usize) {
    let mut next = 0;
    for p in partitions {
        assert_eq!(p.start_node(), next);
        assert!(p.node_count() > 0);
        next = p.end_node();
    }
    assert_eq!(next, num_nodes);
}

/// A random graph whose outdegrees follow a rough power law.
fn skewed_graph(n: usize, seed: u64) -> VecGraph {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut g = VecGraph::empty(n);
    for u in 0..n {
        let degree = n / rng.random_range(1..=n);
        for _ in 0..degree {
            g.add_arc(u, rng.random_range(0..n));
        }
    }
    g
}

#[test]
fn test_random_partitions() {
    for seed in 0..10 {
        let n = 100 + seed as usize * 37;
        let g = skewed_graph(n, seed);
        for batch_size in [0, 1, 2, 7, 100, 10_000] {
            let partitions = degree_partition(&g, batch_size);
            check_coverage(&partitions, n);
            for concurrency in [0, 1, 2, 3, 5, 16, 1000] {
                let merged = merge_partitions(partitions.clone(), concurrency);
                check_coverage(&merged, n);
                assert!(merged.len() <= concurrency.max(1));
                assert_eq!(merged.len(), partitions.len().min(concurrency.max(1)));
            }
        }
    }
}

#[test]
fn test_throttling_on_graph() {
    let g = skewed_graph(5000, 0);
    let partitions = degree_partition(&g, 1);
    let model = CostModel::DEFAULT;
    let requested = 32;
    let needed = estimate_memory(&model, &partitions, requested);

    for available in [0, needed / 4, needed / 2, needed - 1] {
        let concurrency = ConcurrencyPlanner::new(available).throttle(requested, &partitions);
        assert!(concurrency < requested);
        assert!(concurrency >= 1);
        if concurrency > 1 {
            assert!(estimate_memory(&model, &partitions, concurrency) <= available);
        }
    }

    assert_eq!(
        ConcurrencyPlanner::new(needed).throttle(requested, &partitions),
        requested
    );
}
