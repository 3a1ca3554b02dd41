// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bounded Queues
//!
//! Thread-safe bounded FIFOs for the ingest path: a single-lock ring queue
//! and the dual queue that isolates protected-level traffic from main-queue
//! pressure.
//!
//! ## Design
//!
//! - **Short critical sections**: every operation takes one lock, touches
//!   the deque, and releases; no allocation or I/O under the lock
//! - **No unbounded growth**: enqueue refuses when the chosen sub-queue is
//!   at capacity; refusals increment per-queue drop counters
//! - **Protected priority**: dequeue drains the protected queue first;
//!   while shedding is active, main-queue drains are suppressed entirely
//!
//! Producers may live on arbitrary OS threads; workers poll from the tokio
//! loop. Neither side blocks on the other beyond the lock hold time.

use parking_lot::Mutex;
use sealog_domain::LogEvent;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Thread-safe bounded FIFO queue.
///
/// All public methods take a short exclusive critical section around the
/// backing deque. Works across thread boundaries; no async dependency.
#[derive(Debug)]
pub struct RingQueue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T> RingQueue<T> {
    /// Creates a queue with the given capacity (must be > 0; a zero
    /// capacity is promoted to 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::with_capacity(capacity.max(1).min(1024))),
        }
    }

    /// Maximum items the queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// True when the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.items.lock().len() >= self.capacity
    }

    /// Attempts to enqueue; returns false when full.
    pub fn try_enqueue(&self, item: T) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(item);
        true
    }

    /// Attempts to dequeue the oldest item.
    pub fn try_dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }
}

/// Routes events to a main or protected bounded queue by level.
///
/// Protected-level events go to a dedicated queue, isolating them from main
/// queue pressure. Workers always drain the protected queue first. Under
/// shedding, main-queue drains are suppressed so workers spend their cycles
/// exclusively on protected traffic.
#[derive(Debug)]
pub struct DualQueue {
    main: RingQueue<LogEvent>,
    protected: RingQueue<LogEvent>,
    protected_levels: HashSet<String>,
    main_drops: AtomicU64,
    protected_drops: AtomicU64,
    shedding: AtomicBool,
}

impl DualQueue {
    /// Creates a dual queue with the given capacities and protected set.
    ///
    /// Level names are matched case-insensitively (stored uppercased).
    pub fn new(
        main_capacity: usize,
        protected_capacity: usize,
        protected_levels: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            main: RingQueue::new(main_capacity),
            protected: RingQueue::new(protected_capacity),
            protected_levels: protected_levels
                .into_iter()
                .map(|level| level.to_uppercase())
                .collect(),
            main_drops: AtomicU64::new(0),
            protected_drops: AtomicU64::new(0),
            shedding: AtomicBool::new(false),
        }
    }

    fn is_protected(&self, event: &LogEvent) -> bool {
        !self.protected_levels.is_empty()
            && self.protected_levels.contains(&event.level.to_uppercase())
    }

    /// Main queue capacity (the capacity pressure is measured against).
    pub fn capacity(&self) -> usize {
        self.main.capacity()
    }

    /// Protected queue capacity.
    pub fn protected_capacity(&self) -> usize {
        self.protected.capacity()
    }

    /// Protected level names (uppercased).
    pub fn protected_levels(&self) -> &HashSet<String> {
        &self.protected_levels
    }

    /// Suppresses main-queue drains until deactivated.
    pub fn activate_shedding(&self) {
        self.shedding.store(true, Ordering::SeqCst);
    }

    /// Restores main-queue drains.
    pub fn deactivate_shedding(&self) {
        self.shedding.store(false, Ordering::SeqCst);
    }

    /// True while main-queue drains are suppressed.
    pub fn is_shedding(&self) -> bool {
        self.shedding.load(Ordering::SeqCst)
    }

    /// Routes the event by level and attempts to enqueue it.
    ///
    /// Returns false when the chosen sub-queue is full; the corresponding
    /// drop counter is incremented on refusal.
    pub fn try_enqueue(&self, event: LogEvent) -> bool {
        self.offer(event).is_none()
    }

    /// Like [`DualQueue::try_enqueue`], but hands the event back on
    /// refusal so backpressure waits can retry without cloning.
    pub fn offer(&self, event: LogEvent) -> Option<LogEvent> {
        if self.is_protected(&event) {
            let mut items = self.protected.items.lock();
            if items.len() >= self.protected.capacity {
                drop(items);
                self.protected_drops.fetch_add(1, Ordering::Relaxed);
                return Some(event);
            }
            items.push_back(event);
            None
        } else {
            let mut items = self.main.items.lock();
            if items.len() >= self.main.capacity {
                drop(items);
                self.main_drops.fetch_add(1, Ordering::Relaxed);
                return Some(event);
            }
            items.push_back(event);
            None
        }
    }

    /// Dequeues the next event, protected queue first.
    ///
    /// While shedding is active, returns `None` when the protected queue is
    /// empty even if main-queue events are waiting.
    pub fn try_dequeue(&self) -> Option<LogEvent> {
        if let Some(event) = self.protected.try_dequeue() {
            return Some(event);
        }
        if self.is_shedding() {
            return None;
        }
        self.main.try_dequeue()
    }

    /// Drains all protected then all main events into the batch buffer.
    ///
    /// Used on stop and on explicit flush; ignores shedding so a drain
    /// always empties both queues.
    pub fn drain_into(&self, batch: &mut Vec<LogEvent>) {
        while let Some(event) = self.protected.try_dequeue() {
            batch.push(event);
        }
        while let Some(event) = self.main.try_dequeue() {
            batch.push(event);
        }
    }

    /// Main queue depth.
    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    /// Protected queue depth.
    pub fn protected_len(&self) -> usize {
        self.protected.len()
    }

    /// Combined depth of both queues.
    pub fn len(&self) -> usize {
        self.main.len() + self.protected.len()
    }

    /// True when both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.protected.is_empty()
    }

    /// Events refused by the main queue.
    pub fn main_drops(&self) -> u64 {
        self.main_drops.load(Ordering::Relaxed)
    }

    /// Events refused by the protected queue.
    pub fn protected_drops(&self) -> u64 {
        self.protected_drops.load(Ordering::Relaxed)
    }
}
