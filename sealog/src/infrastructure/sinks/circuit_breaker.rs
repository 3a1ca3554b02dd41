// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sink Circuit Breaker
//!
//! Per-sink state machine that suppresses writes after repeated failures.
//!
//! ## State Machine
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ──────────────────────────► OPEN
//!     ▲                                  │ recovery_timeout elapsed,
//!     │ success                          │ next admission allowed
//!     │                                  ▼
//!     └────────────────────────────  HALF_OPEN
//!                 failure: reopen, reset timer
//! ```
//!
//! Exactly one probe write is admitted after the recovery window; further
//! admissions are refused until the probe's outcome is recorded. State
//! changes are published to registered listeners, which feed the pressure
//! monitor's circuit boost and the metrics collector.

use parking_lot::Mutex;
use sealog_domain::CircuitState;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Listener invoked on every state transition with (sink_name, new_state).
pub type StateChangeListener = Arc<dyn Fn(&str, CircuitState) + Send + Sync>;

/// Circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before admitting a probe.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-sink circuit breaker.
pub struct SinkCircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    listeners: Vec<StateChangeListener>,
}

impl SinkCircuitBreaker {
    /// Creates a closed breaker for the named sink.
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        listeners: Vec<StateChangeListener>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            listeners,
        }
    }

    /// Sink name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Whether a write may be attempted right now.
    ///
    /// In OPEN, the first call after the recovery timeout transitions to
    /// HALF_OPEN and admits exactly one probe; subsequent calls are refused
    /// until the probe outcome is recorded.
    pub fn should_allow(&self) -> bool {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    state.state = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    drop(state);
                    self.notify(CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    false
                } else {
                    state.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful write.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Closed;
                state.opened_at = None;
                state.probe_in_flight = false;
                drop(state);
                self.notify(CircuitState::Closed);
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Records a failed write.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                    drop(state);
                    self.notify(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                state.probe_in_flight = false;
                drop(state);
                self.notify(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn notify(&self, new_state: CircuitState) {
        for listener in &self.listeners {
            listener(&self.name, new_state);
        }
    }
}
