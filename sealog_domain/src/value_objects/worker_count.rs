// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Count Value Object
//!
//! This module provides the worker count value object used by the adaptive
//! worker pool. It enforces operational bounds and computes pressure-scaled
//! targets for the pool's actuator.
//!
//! ## Overview
//!
//! - **Bounded**: worker counts are clamped to [1, 32] so misconfiguration
//!   can neither starve the pipeline nor exhaust the scheduler
//! - **Pressure-Scaled**: `scaled(factor, max)` computes
//!   `ceil(initial x factor)` clamped to `[initial, max]`, the contract the
//!   worker pool applies on every pressure transition
//! - **Type-Safe**: a `WorkerCount` cannot be confused with other numeric
//!   configuration in wiring code

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker count value object for the adaptive worker pool.
///
/// # Benefits Over Raw Numbers
///
/// - **Type Safety**: `WorkerCount` cannot be confused with other numeric
///   types in function signatures
/// - **Domain Semantics**: scaling rules live with the value they govern
/// - **Bounded**: enforces minimum and maximum limits for reliable operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerCount {
    count: usize,
}

impl WorkerCount {
    /// Minimum number of workers (always at least 1)
    pub const MIN_WORKERS: usize = 1;

    /// Maximum number of workers (prevent scheduler exhaustion)
    pub const MAX_WORKERS: usize = 32;

    /// Default worker count for fallback scenarios
    pub const DEFAULT_WORKERS: usize = 2;

    /// Creates a new WorkerCount with the specified number of workers.
    ///
    /// The value is clamped to [`MIN_WORKERS`, `MAX_WORKERS`].
    pub fn new(count: usize) -> Self {
        Self {
            count: count.clamp(Self::MIN_WORKERS, Self::MAX_WORKERS),
        }
    }

    /// Derives a default worker count from available parallelism, capped at
    /// a small fixed number so a logging pipeline never claims the machine.
    pub fn from_available_parallelism() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(Self::DEFAULT_WORKERS);
        Self::new(cores.min(4))
    }

    /// Returns the number of workers.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Computes the pressure-scaled target for this initial count.
    ///
    /// Target is `ceil(initial x factor)` clamped to `[initial, max]`; the
    /// pool never scales below its initial workers and never beyond the
    /// configured maximum.
    pub fn scaled(&self, factor: f64, max: usize) -> usize {
        let raw = (self.count as f64 * factor).ceil() as usize;
        raw.clamp(self.count, max.max(self.count))
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORKERS)
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} workers", self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_to_bounds() {
        assert_eq!(WorkerCount::new(0).count(), WorkerCount::MIN_WORKERS);
        assert_eq!(WorkerCount::new(100).count(), WorkerCount::MAX_WORKERS);
        assert_eq!(WorkerCount::new(4).count(), 4);
    }

    #[test]
    fn test_scaled_rounds_up_and_clamps() {
        let initial = WorkerCount::new(2);
        assert_eq!(initial.scaled(1.0, 8), 2);
        assert_eq!(initial.scaled(1.5, 8), 3);
        assert_eq!(initial.scaled(2.0, 8), 4);
        // Clamped to max
        assert_eq!(initial.scaled(2.0, 3), 3);
        // Never below initial
        assert_eq!(initial.scaled(0.5, 8), 2);
    }

    #[test]
    fn test_default_parallelism_is_bounded() {
        let count = WorkerCount::from_available_parallelism();
        assert!(count.count() >= 1 && count.count() <= 4);
    }
}
