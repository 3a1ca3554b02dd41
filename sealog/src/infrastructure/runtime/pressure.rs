// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pressure Monitor
//!
//! Periodic task that samples queue fill, runs the hysteresis escalation
//! ladder, and dispatches level-change callbacks to the actuators (filter
//! ladder, worker pool, batch sizing, shedding).
//!
//! ## Escalation Ladder
//!
//! Escalation and de-escalation use different thresholds to prevent
//! oscillation; at most one level change happens per evaluation, and a
//! cooldown blocks further transitions after each change (the first
//! evaluation is exempt).
//!
//! ```text
//! escalate:    ELEVATED >= 0.60   HIGH >= 0.80   CRITICAL >= 0.92
//! de-escalate: from CRITICAL < 0.75   from HIGH < 0.60   from ELEVATED < 0.40
//! ```
//!
//! ## Circuit Boost
//!
//! Each open sink circuit adds a configured boost to the effective fill
//! ratio, so sink outages push the controller toward shedding even when the
//! queue itself still has room. Effective fill is capped at 1.0.
//!
//! The monitor also accumulates the adaptive summary reported on drain:
//! escalation counts, time at each level, peak level, and actuator event
//! counts.

use crate::infrastructure::config::PressureSettings;
use crate::infrastructure::diagnostics::Diagnostics;
use crate::infrastructure::metrics::MetricsCollector;
use crate::infrastructure::runtime::queue::DualQueue;
use parking_lot::Mutex;
use sealog_bootstrap::CancellationToken;
use sealog_domain::{AdaptiveSummary, LevelDurations, PressureChanged, PressureLevel};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked on pressure level changes.
pub type PressureCallback = Box<dyn Fn(&PressureChanged) + Send + Sync>;

/// Hysteresis state machine computing pressure level from fill ratio.
///
/// At most one level change per `evaluate` call; the cooldown blocks
/// transitions until enough time has passed since the previous one.
pub struct EscalationLadder {
    level: PressureLevel,
    cooldown: Duration,
    last_transition: Option<Instant>,
    settings: PressureSettings,
}

impl EscalationLadder {
    /// Creates a ladder at NORMAL with the given thresholds.
    pub fn new(settings: PressureSettings) -> Self {
        Self {
            level: PressureLevel::Normal,
            cooldown: Duration::from_secs_f64(settings.cooldown_seconds.max(0.0)),
            last_transition: None,
            settings,
        }
    }

    /// Current pressure level.
    pub fn current_level(&self) -> PressureLevel {
        self.level
    }

    fn escalate_threshold(&self, to: PressureLevel) -> Option<f64> {
        match to {
            PressureLevel::Elevated => Some(self.settings.escalate_to_elevated),
            PressureLevel::High => Some(self.settings.escalate_to_high),
            PressureLevel::Critical => Some(self.settings.escalate_to_critical),
            PressureLevel::Normal => None,
        }
    }

    fn deescalate_threshold(&self, to: PressureLevel) -> Option<f64> {
        match to {
            PressureLevel::High => Some(self.settings.deescalate_from_critical),
            PressureLevel::Elevated => Some(self.settings.deescalate_from_high),
            PressureLevel::Normal => Some(self.settings.deescalate_from_elevated),
            PressureLevel::Critical => None,
        }
    }

    /// Evaluates a fill ratio and returns the (possibly updated) level.
    pub fn evaluate(&mut self, fill_ratio: f64) -> PressureLevel {
        if let Some(last) = self.last_transition {
            if last.elapsed() < self.cooldown {
                return self.level;
            }
        }

        if let Some(next) = self.level.next_up() {
            if let Some(threshold) = self.escalate_threshold(next) {
                if fill_ratio >= threshold {
                    self.level = next;
                    self.last_transition = Some(Instant::now());
                    return self.level;
                }
            }
        }

        if let Some(prev) = self.level.next_down() {
            if let Some(threshold) = self.deescalate_threshold(prev) {
                if fill_ratio < threshold {
                    self.level = prev;
                    self.last_transition = Some(Instant::now());
                    return self.level;
                }
            }
        }

        self.level
    }
}

/// Actuator event counters, shared between the monitor and the actuator
/// callbacks (filter ladder, worker pool, batch sizing).
#[derive(Default)]
pub struct ActuatorStats {
    filters_swapped: AtomicU64,
    workers_scaled: AtomicU64,
    peak_workers: AtomicUsize,
    batch_resize_count: AtomicU64,
}

impl ActuatorStats {
    /// Records a filter ladder swap.
    pub fn record_filter_swap(&self) {
        self.filters_swapped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker scaling event and tracks the peak count.
    pub fn record_worker_scaling(&self, count: usize) {
        self.workers_scaled.fetch_add(1, Ordering::Relaxed);
        self.peak_workers.fetch_max(count, Ordering::Relaxed);
    }

    /// Records a batch resize event.
    pub fn record_batch_resize(&self) {
        self.batch_resize_count.fetch_add(1, Ordering::Relaxed);
    }
}

struct SummaryState {
    escalation_count: u64,
    deescalation_count: u64,
    peak_level: PressureLevel,
    level_entered_at: Instant,
    time_at_level: LevelDurations,
}

struct MonitorState {
    ladder: EscalationLadder,
    summary: SummaryState,
}

/// Periodic task sampling queue fill and dispatching pressure changes.
pub struct PressureMonitor {
    queue: Arc<DualQueue>,
    interval: Duration,
    boost_per_open: f64,
    open_circuits: Arc<AtomicUsize>,
    actuators: Arc<ActuatorStats>,
    callbacks: Vec<PressureCallback>,
    metrics: MetricsCollector,
    diagnostics: Diagnostics,
    token: CancellationToken,
    state: Mutex<MonitorState>,
}

impl PressureMonitor {
    /// Creates a monitor over the given queue.
    pub fn new(
        queue: Arc<DualQueue>,
        settings: PressureSettings,
        metrics: MetricsCollector,
        diagnostics: Diagnostics,
    ) -> Self {
        let interval = Duration::from_secs_f64(settings.check_interval_seconds.max(0.001));
        let boost_per_open = settings.circuit_pressure_boost;
        Self {
            queue,
            interval,
            boost_per_open,
            open_circuits: Arc::new(AtomicUsize::new(0)),
            actuators: Arc::new(ActuatorStats::default()),
            callbacks: Vec::new(),
            metrics,
            diagnostics,
            token: CancellationToken::new(),
            state: Mutex::new(MonitorState {
                ladder: EscalationLadder::new(settings),
                summary: SummaryState {
                    escalation_count: 0,
                    deescalation_count: 0,
                    peak_level: PressureLevel::Normal,
                    level_entered_at: Instant::now(),
                    time_at_level: LevelDurations::default(),
                },
            }),
        }
    }

    /// Registers a callback invoked on pressure level changes. Must be
    /// called before the monitor task is spawned.
    pub fn on_level_change(&mut self, callback: PressureCallback) {
        self.callbacks.push(callback);
    }

    /// Shared open-circuit counter; circuit breaker listeners adjust it and
    /// each open circuit adds `circuit_pressure_boost` to effective fill.
    pub fn open_circuit_counter(&self) -> Arc<AtomicUsize> {
        self.open_circuits.clone()
    }

    /// Shared actuator counters, recorded by the level-change actuators
    /// and folded into the drain summary.
    pub fn actuators(&self) -> Arc<ActuatorStats> {
        self.actuators.clone()
    }

    /// Current pressure level.
    pub fn pressure_level(&self) -> PressureLevel {
        self.state.lock().ladder.current_level()
    }

    /// Signals the monitor loop to stop after the current tick.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Main monitor loop; runs until `stop()` is called.
    pub async fn run(self: Arc<Self>) {
        while !self.token.is_cancelled() {
            self.tick();
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Single evaluation cycle: sample, evaluate, dispatch.
    fn tick(&self) {
        let capacity = self.queue.capacity();
        if capacity == 0 {
            return;
        }
        // Protected queue depth is a separate signal, not part of adaptive
        // pressure; only the main queue drives the ladder.
        let depth = self.queue.main_len();
        self.metrics.set_queue_depth("main", depth as i64);
        self.metrics
            .set_queue_depth("protected", self.queue.protected_len() as i64);
        self.metrics
            .set_queue_drops("main", self.queue.main_drops() as i64);
        self.metrics
            .set_queue_drops("protected", self.queue.protected_drops() as i64);

        let boost = self.open_circuits.load(Ordering::Relaxed) as f64 * self.boost_per_open;
        let fill_ratio = (depth as f64 / capacity as f64 + boost).min(1.0);

        // Shedding: while CRITICAL with protected backlog, workers spend
        // their cycles exclusively on protected traffic. Lifted as soon as
        // the protected queue empties so the main queue can drain and the
        // ladder can de-escalate.
        let shed =
            self.pressure_level() == PressureLevel::Critical && self.queue.protected_len() > 0;
        if shed {
            self.queue.activate_shedding();
        } else {
            self.queue.deactivate_shedding();
        }

        let change = {
            let mut state = self.state.lock();
            let old_level = state.ladder.current_level();
            let new_level = state.ladder.evaluate(fill_ratio);
            if new_level == old_level {
                None
            } else {
                let now = Instant::now();
                let elapsed = now
                    .duration_since(state.summary.level_entered_at)
                    .as_secs_f64();
                state.summary.time_at_level.add(old_level, elapsed);
                state.summary.level_entered_at = now;
                if new_level > old_level {
                    state.summary.escalation_count += 1;
                } else {
                    state.summary.deescalation_count += 1;
                }
                if new_level > state.summary.peak_level {
                    state.summary.peak_level = new_level;
                }
                Some(PressureChanged {
                    from: old_level,
                    to: new_level,
                    fill_ratio,
                })
            }
        };

        if let Some(change) = change {
            self.diagnostics.warn(
                "adaptive-controller",
                "pressure level changed",
                &[
                    ("from_level", change.from.as_str()),
                    ("to_level", change.to.as_str()),
                    ("fill_ratio", &format!("{:.4}", change.fill_ratio)),
                ],
            );
            self.metrics.set_pressure_level(change.to);
            for callback in &self.callbacks {
                callback(&change);
            }
        }
    }

    /// Captures the adaptive summary; call before teardown.
    pub fn snapshot(&self) -> AdaptiveSummary {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now
            .duration_since(state.summary.level_entered_at)
            .as_secs_f64();
        let current = state.ladder.current_level();
        state.summary.time_at_level.add(current, elapsed);
        state.summary.level_entered_at = now;

        AdaptiveSummary {
            peak_pressure_level: state.summary.peak_level,
            escalation_count: state.summary.escalation_count,
            deescalation_count: state.summary.deescalation_count,
            time_at_level: state.summary.time_at_level,
            filters_swapped: self.actuators.filters_swapped.load(Ordering::Relaxed),
            workers_scaled: self.actuators.workers_scaled.load(Ordering::Relaxed),
            peak_workers: self.actuators.peak_workers.load(Ordering::Relaxed),
            batch_resize_count: self.actuators.batch_resize_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder_with_cooldown(cooldown_seconds: f64) -> EscalationLadder {
        EscalationLadder::new(PressureSettings {
            cooldown_seconds,
            ..PressureSettings::default()
        })
    }

    #[test]
    fn test_escalates_one_step_per_evaluation() {
        let mut ladder = ladder_with_cooldown(0.0);
        // Even a saturated queue climbs one level at a time
        assert_eq!(ladder.evaluate(1.0), PressureLevel::Elevated);
        assert_eq!(ladder.evaluate(1.0), PressureLevel::High);
        assert_eq!(ladder.evaluate(1.0), PressureLevel::Critical);
        assert_eq!(ladder.evaluate(1.0), PressureLevel::Critical);
    }

    #[test]
    fn test_thresholds_match_ladder() {
        let mut ladder = ladder_with_cooldown(0.0);
        assert_eq!(ladder.evaluate(0.59), PressureLevel::Normal);
        assert_eq!(ladder.evaluate(0.60), PressureLevel::Elevated);
        assert_eq!(ladder.evaluate(0.79), PressureLevel::Elevated);
        assert_eq!(ladder.evaluate(0.80), PressureLevel::High);
        assert_eq!(ladder.evaluate(0.91), PressureLevel::High);
        assert_eq!(ladder.evaluate(0.92), PressureLevel::Critical);
    }

    #[test]
    fn test_hysteresis_band_holds_level() {
        let mut ladder = ladder_with_cooldown(0.0);
        ladder.evaluate(0.65); // -> Elevated
                               // Below the escalate-to-high threshold but above deescalate-from-elevated
        assert_eq!(ladder.evaluate(0.50), PressureLevel::Elevated);
        assert_eq!(ladder.evaluate(0.45), PressureLevel::Elevated);
        // Drops below 0.40 -> back to Normal
        assert_eq!(ladder.evaluate(0.39), PressureLevel::Normal);
    }

    #[test]
    fn test_deescalation_thresholds() {
        let mut ladder = ladder_with_cooldown(0.0);
        ladder.evaluate(1.0);
        ladder.evaluate(1.0);
        ladder.evaluate(1.0); // -> Critical
        assert_eq!(ladder.evaluate(0.75), PressureLevel::Critical);
        assert_eq!(ladder.evaluate(0.74), PressureLevel::High);
        assert_eq!(ladder.evaluate(0.60), PressureLevel::High);
        assert_eq!(ladder.evaluate(0.59), PressureLevel::Elevated);
        assert_eq!(ladder.evaluate(0.39), PressureLevel::Normal);
    }

    #[test]
    fn test_cooldown_blocks_transitions() {
        let mut ladder = ladder_with_cooldown(60.0);
        // First transition always allowed
        assert_eq!(ladder.evaluate(0.95), PressureLevel::Elevated);
        // Cooldown blocks the next step despite saturation
        assert_eq!(ladder.evaluate(0.95), PressureLevel::Elevated);
        assert_eq!(ladder.evaluate(0.95), PressureLevel::Elevated);
    }

    #[tokio::test]
    async fn test_monitor_dispatches_level_change_callbacks() {
        use parking_lot::Mutex as PMutex;

        let queue = Arc::new(DualQueue::new(10, 10, Vec::<String>::new()));
        // Fill the main queue completely
        for _ in 0..10 {
            queue.try_enqueue(sealog_domain::LogEvent {
                timestamp: 1.0,
                level: "INFO".to_string(),
                message: "m".to_string(),
                logger: "root".to_string(),
                correlation_id: "c".to_string(),
                metadata: serde_json::Map::new(),
            });
        }

        let settings = PressureSettings {
            check_interval_seconds: 0.01,
            cooldown_seconds: 0.0,
            ..PressureSettings::default()
        };
        let mut monitor = PressureMonitor::new(
            queue,
            settings,
            MetricsCollector::disabled(),
            Diagnostics::disabled(),
        );
        let changes: Arc<PMutex<Vec<(PressureLevel, PressureLevel)>>> =
            Arc::new(PMutex::new(Vec::new()));
        let seen = changes.clone();
        monitor.on_level_change(Box::new(move |change| {
            seen.lock().push((change.from, change.to));
        }));

        let monitor = Arc::new(monitor);
        let handle = tokio::spawn(monitor.clone().run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        monitor.stop();
        let _ = handle.await;

        let changes = changes.lock();
        assert!(
            changes.len() >= 3,
            "expected full escalation, got {:?}",
            changes
        );
        assert_eq!(changes[0], (PressureLevel::Normal, PressureLevel::Elevated));
        assert_eq!(monitor.pressure_level(), PressureLevel::Critical);

        let summary = monitor.snapshot();
        assert_eq!(summary.peak_pressure_level, PressureLevel::Critical);
        assert_eq!(summary.escalation_count, 3);
    }

    #[tokio::test]
    async fn test_circuit_boost_raises_effective_fill() {
        let queue = Arc::new(DualQueue::new(100, 10, Vec::<String>::new()));
        let settings = PressureSettings {
            check_interval_seconds: 0.01,
            cooldown_seconds: 0.0,
            ..PressureSettings::default()
        };
        let monitor = Arc::new(PressureMonitor::new(
            queue,
            settings,
            MetricsCollector::disabled(),
            Diagnostics::disabled(),
        ));
        // Empty queue, but three open circuits add 0.60 boost -> Elevated
        monitor.open_circuit_counter().store(3, Ordering::SeqCst);

        let handle = tokio::spawn(monitor.clone().run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.stop();
        let _ = handle.await;

        assert!(monitor.pressure_level() >= PressureLevel::Elevated);
    }
}
