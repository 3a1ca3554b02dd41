// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Domain Events
//!
//! Events published by the adaptive controller and the sink circuit
//! breakers. The cyclic dependencies of the runtime (pressure monitor <->
//! circuit breakers <-> filter ladder <-> worker pool) are broken by message
//! passing: each component publishes events and consumes the events of the
//! others without holding references to them.

use crate::value_objects::PressureLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Circuit breaker states for sink fault isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Writes flow normally; failures are counted.
    Closed,
    /// Writes are suppressed until the recovery timeout elapses.
    Open,
    /// One probe write is admitted to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

/// Published when the escalation ladder changes pressure level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureChanged {
    pub from: PressureLevel,
    pub to: PressureLevel,
    /// Effective fill ratio (including circuit boost) at transition time.
    pub fill_ratio: f64,
}

impl PressureChanged {
    /// True when the transition moved up the ladder.
    pub fn is_escalation(&self) -> bool {
        self.to > self.from
    }
}

/// Published when a sink circuit breaker changes state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStateChanged {
    pub sink: String,
    pub state: CircuitState,
}

/// Published when the worker pool applies a scaling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolScaled {
    pub from: usize,
    pub to: usize,
    pub level: PressureLevel,
}
