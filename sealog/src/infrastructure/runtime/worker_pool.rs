// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adaptive Worker Pool
//!
//! Manages initial (static) and dynamic worker tasks. Initial workers live
//! for the logger's lifetime and only stop at drain; dynamic workers are
//! added and retired as pressure changes.
//!
//! ## Scaling Ladder
//!
//! ```text
//! NORMAL x1.0   ELEVATED x1.0   HIGH x1.5   CRITICAL x2.0
//! ```
//!
//! Target is `ceil(initial x factor)`, clamped to `[initial, max]`.
//! Retirement is LIFO: the most recently added dynamic workers get their
//! stop flags first, finish their current batch, and exit.

use parking_lot::Mutex;
use sealog_domain::{PressureLevel, WorkerCount};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Worker count multiplier for a pressure level.
pub fn scale_factor(level: PressureLevel) -> f64 {
    match level {
        PressureLevel::Normal | PressureLevel::Elevated => 1.0,
        PressureLevel::High => 1.5,
        PressureLevel::Critical => 2.0,
    }
}

/// Per-worker stop flag; retired workers finish their current batch and
/// exit when it is set.
#[derive(Clone)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Sets the flag.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Reads the flag.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns one worker task observing the given stop flag.
pub type WorkerFactory = Arc<dyn Fn(StopFlag) -> JoinHandle<()> + Send + Sync>;

struct PoolState {
    initial_workers: Vec<(JoinHandle<()>, StopFlag)>,
    dynamic_workers: Vec<(JoinHandle<()>, StopFlag)>,
}

/// Pool managing initial and dynamically-scaled worker tasks.
pub struct WorkerPool {
    initial: WorkerCount,
    max_workers: usize,
    factory: WorkerFactory,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Creates a pool; call [`WorkerPool::spawn_initial`] to start the
    /// static workers.
    pub fn new(initial: WorkerCount, max_workers: usize, factory: WorkerFactory) -> Self {
        Self {
            initial,
            max_workers: max_workers.max(initial.count()),
            factory,
            state: Mutex::new(PoolState {
                initial_workers: Vec::new(),
                dynamic_workers: Vec::new(),
            }),
        }
    }

    /// Spawns the initial worker tasks.
    pub fn spawn_initial(&self) {
        let mut state = self.state.lock();
        for _ in 0..self.initial.count() {
            let flag = StopFlag::new();
            let handle = (self.factory)(flag.clone());
            state.initial_workers.push((handle, flag));
        }
    }

    /// Total active workers (initial + dynamic).
    pub fn current_count(&self) -> usize {
        let state = self.state.lock();
        state.initial_workers.len() + state.dynamic_workers.len()
    }

    /// Number of active dynamic workers.
    pub fn dynamic_count(&self) -> usize {
        self.state.lock().dynamic_workers.len()
    }

    /// Target worker count for a pressure level.
    pub fn target_for_level(&self, level: PressureLevel) -> usize {
        self.initial.scaled(scale_factor(level), self.max_workers)
    }

    /// Scales the pool to `target` (clamped to `[initial, max]`); returns
    /// the resulting count.
    pub fn scale_to(&self, target: usize) -> usize {
        let target = target.clamp(self.initial.count(), self.max_workers);
        let mut state = self.state.lock();
        let current = state.initial_workers.len() + state.dynamic_workers.len();

        if target > current {
            for _ in 0..(target - current) {
                let flag = StopFlag::new();
                let handle = (self.factory)(flag.clone());
                state.dynamic_workers.push((handle, flag));
            }
        } else if target < current {
            let retire = (current - target).min(state.dynamic_workers.len());
            // LIFO: most recently added workers retire first
            for _ in 0..retire {
                if let Some((_, flag)) = state.dynamic_workers.pop() {
                    flag.set();
                }
            }
        }

        state.initial_workers.len() + state.dynamic_workers.len()
    }

    /// Sets every stop flag and returns all handles for awaiting.
    pub fn drain_all(&self) -> Vec<JoinHandle<()>> {
        let mut state = self.state.lock();
        let mut handles = Vec::new();
        for (handle, flag) in state.initial_workers.drain(..) {
            flag.set();
            handles.push(handle);
        }
        for (handle, flag) in state.dynamic_workers.drain(..) {
            flag.set();
            handles.push(handle);
        }
        handles
    }
}
