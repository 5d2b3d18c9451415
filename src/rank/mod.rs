/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Partition-based parallel centralities.
//!
//! The entry point is [`PageRank`]; the other modules contain the stages of
//! the computation:
//!
//! - [`partition`]: degree-balanced partitioning of the node space;
//! - [`concurrency`]: memory-aware throttling of the number of workers;
//! - [`compute_step`]: the per-partition state machine;
//! - [`coordinator`]: barrier synchronization, exchange and convergence;
//! - [`result`]: assembly and normalization of the rank vector.

pub mod compute_step;
pub mod concurrency;
pub mod coordinator;
pub mod pagerank;
pub mod partition;
pub mod result;
pub mod variant;

pub use pagerank::{Config, PageRank, PageRankError};
pub use result::{Normalization, PageRankResult};
