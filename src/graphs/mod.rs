/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

pub mod vec_graph;

pub mod prelude {
    pub use super::vec_graph::VecGraph;
}
