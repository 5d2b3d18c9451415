/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Analytic memory accounting.
//!
//! Memory estimates are computed with a portable cost function: bytes per
//! element times the number of elements, plus a fixed per-structure
//! overhead. The overheads are those of a typical 64-bit allocator and are
//! collected in [`CostModel`], so that they can be tuned once per platform.
//!
//! Actual allocations are reported to an [`AllocationTracker`], which is
//! purely diagnostic: every [`add`](AllocationTracker::add) is paired with a
//! [`remove`](AllocationTracker::remove) of the same amount when the
//! structure is released.

use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed overheads used by the cost functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    /// Bytes of bookkeeping for every heap-allocated array.
    pub array_header: u64,
    /// Bytes of bookkeeping for every heap-allocated structure.
    pub object_header: u64,
    /// Bytes of a pointer.
    pub reference: u64,
}

impl CostModel {
    /// The cost model of a 64-bit platform.
    pub const DEFAULT: Self = Self {
        array_header: 16,
        object_header: 16,
        reference: 8,
    };

    /// Returns the estimated size of an array of `len` `f64`.
    #[inline]
    pub const fn double_array(&self, len: usize) -> u64 {
        self.array_header + 8 * len as u64
    }

    /// Returns the estimated size of an array of `len` `f32`.
    #[inline]
    pub const fn float_array(&self, len: usize) -> u64 {
        self.array_header + 4 * len as u64
    }

    /// Returns the estimated size of an array of `len` `usize`.
    #[inline]
    pub const fn index_array(&self, len: usize) -> u64 {
        self.array_header + 8 * len as u64
    }

    /// Returns the estimated size of an array of `len` pointers.
    #[inline]
    pub const fn reference_array(&self, len: usize) -> u64 {
        self.array_header + self.reference * len as u64
    }

    /// Returns the estimated size of a structure with `fields` word-sized
    /// fields.
    #[inline]
    pub const fn instance(&self, fields: usize) -> u64 {
        self.object_header + 8 * fields as u64
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A thread-safe counter of tracked allocations.
#[derive(Debug, Default)]
pub struct AllocationTracker {
    tracked: AtomicU64,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an allocation of `bytes` bytes.
    #[inline]
    pub fn add(&self, bytes: u64) {
        self.tracked.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a deallocation of `bytes` bytes.
    #[inline]
    pub fn remove(&self, bytes: u64) {
        self.tracked.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Returns the number of bytes currently tracked.
    pub fn tracked(&self) -> u64 {
        self.tracked.load(Ordering::Relaxed)
    }
}

/// Returns the memory available to the process, as reported by the
/// operating system.
pub fn available_memory() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.available_memory()
}

/// Formats a number of bytes using binary prefixes.
pub fn humanize_bytes(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_model() {
        let model = CostModel::DEFAULT;
        assert_eq!(model.double_array(0), 16);
        assert_eq!(model.double_array(10), 96);
        assert_eq!(model.float_array(10), 56);
        assert_eq!(model.reference_array(4), 48);
        assert_eq!(model.instance(2), 32);
    }

    #[test]
    fn test_tracker_pairs() {
        let tracker = AllocationTracker::new();
        tracker.add(100);
        tracker.add(20);
        assert_eq!(tracker.tracked(), 120);
        tracker.remove(100);
        tracker.remove(20);
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize_bytes(512), "512 B");
        assert_eq!(humanize_bytes(2048), "2.00 KiB");
        assert_eq!(humanize_bytes(3 << 30), "3.00 GiB");
    }
}
