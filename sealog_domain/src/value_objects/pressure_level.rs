// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pressure Level Value Object
//!
//! Four-level classification of queue saturation used by the adaptive
//! controller. The level is totally ordered (`NORMAL < ELEVATED < HIGH <
//! CRITICAL`) and transitions are restricted to single steps per evaluation
//! tick by the escalation ladder.
//!
//! ## Escalation Ladder
//!
//! - **Normal**: user-configured behavior, no intervention
//! - **Elevated**: adaptive sampling tightened
//! - **High**: WARNING-level gate injected, worker pool grows
//! - **Critical**: protected-levels-only gate, main-queue shedding
//!
//! The numeric index (0-3) is exported as a gauge metric so dashboards can
//! plot pressure as a step function.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Four-level pressure classification for the adaptive pipeline.
///
/// The derived `Ord` follows variant declaration order, which matches the
/// escalation ladder ordering.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    #[default]
    Normal,
    Elevated,
    High,
    Critical,
}

impl PressureLevel {
    /// All levels in escalation order.
    pub const ALL: [PressureLevel; 4] = [
        PressureLevel::Normal,
        PressureLevel::Elevated,
        PressureLevel::High,
        PressureLevel::Critical,
    ];

    /// Returns the ladder index (0 = Normal .. 3 = Critical).
    pub fn index(self) -> usize {
        match self {
            PressureLevel::Normal => 0,
            PressureLevel::Elevated => 1,
            PressureLevel::High => 2,
            PressureLevel::Critical => 3,
        }
    }

    /// Returns the next level up the ladder, or `None` at Critical.
    pub fn next_up(self) -> Option<PressureLevel> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Returns the next level down the ladder, or `None` at Normal.
    pub fn next_down(self) -> Option<PressureLevel> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Lowercase wire name (matches the serialized representation).
    pub fn as_str(self) -> &'static str {
        match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Elevated => "elevated",
            PressureLevel::High => "high",
            PressureLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
