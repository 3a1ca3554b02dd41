// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Drain Report Entities
//!
//! Structured records returned by `stop_and_drain`: the event accounting
//! (`DrainResult`) and the adaptive controller's lifetime summary
//! (`AdaptiveSummary`).
//!
//! The accounting identity the pipeline maintains for any input sequence is
//! `submitted = processed + dropped + in_flight`; after a completed drain,
//! `in_flight` is zero.

use crate::value_objects::PressureLevel;
use serde::{Deserialize, Serialize};

/// Wall time spent at each pressure level, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDurations {
    pub normal: f64,
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

impl LevelDurations {
    /// Adds elapsed seconds to the bucket for `level`.
    pub fn add(&mut self, level: PressureLevel, seconds: f64) {
        match level {
            PressureLevel::Normal => self.normal += seconds,
            PressureLevel::Elevated => self.elevated += seconds,
            PressureLevel::High => self.high += seconds,
            PressureLevel::Critical => self.critical += seconds,
        }
    }

    /// Returns the seconds accumulated for `level`.
    pub fn get(&self, level: PressureLevel) -> f64 {
        match level {
            PressureLevel::Normal => self.normal,
            PressureLevel::Elevated => self.elevated,
            PressureLevel::High => self.high,
            PressureLevel::Critical => self.critical,
        }
    }
}

/// Adaptive controller summary reported once on drain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSummary {
    /// Highest pressure level reached during the logger's lifetime.
    pub peak_pressure_level: PressureLevel,
    /// Number of one-step escalations.
    pub escalation_count: u64,
    /// Number of one-step de-escalations.
    pub deescalation_count: u64,
    /// Wall time spent at each level.
    pub time_at_level: LevelDurations,
    /// Filter ladder swaps applied.
    pub filters_swapped: u64,
    /// Worker pool scaling events applied.
    pub workers_scaled: u64,
    /// Peak concurrent worker count reached.
    pub peak_workers: usize,
    /// Batch resize events applied.
    pub batch_resize_count: u64,
}

/// Event accounting returned by `stop_and_drain`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainResult {
    /// Events accepted by the producer facade.
    pub submitted: u64,
    /// Events delivered to the sink writer.
    pub processed: u64,
    /// Events dropped (queue refusal, filter escalation, serialization).
    pub dropped: u64,
    /// Adaptive controller summary for the logger's lifetime.
    pub adaptive: AdaptiveSummary,
}
