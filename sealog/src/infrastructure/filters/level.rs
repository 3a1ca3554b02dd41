// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Level Filter
//!
//! Drops events below a minimum level threshold. Doubles as the escalation
//! gate the filter ladder injects under HIGH (WARNING threshold) and
//! CRITICAL (minimum protected priority) pressure.

use async_trait::async_trait;
use sealog_domain::services::stage::Filter;
use sealog_domain::value_objects::LevelRegistry;
use sealog_domain::{LogEvent, PipelineError};

/// Configuration for [`LevelFilter`].
#[derive(Debug, Clone)]
pub struct LevelFilterConfig {
    /// Minimum level name that passes the gate.
    pub min_level: String,
    /// When false the filter is a no-op (kept for config symmetry).
    pub drop_below: bool,
}

impl Default for LevelFilterConfig {
    fn default() -> Self {
        Self {
            min_level: "INFO".to_string(),
            drop_below: true,
        }
    }
}

/// Filter events by log level threshold.
pub struct LevelFilter {
    registry: LevelRegistry,
    min_priority: u8,
    drop_below: bool,
}

impl LevelFilter {
    /// Creates a gate at the priority of `config.min_level`.
    pub fn new(config: LevelFilterConfig, registry: LevelRegistry) -> Self {
        let min_priority = registry.priority(&config.min_level);
        Self {
            registry,
            min_priority,
            drop_below: config.drop_below,
        }
    }

    /// Creates a gate at an explicit numeric priority. A priority above the
    /// registry maximum blocks every event.
    pub fn with_priority(min_priority: u8, registry: LevelRegistry) -> Self {
        Self {
            registry,
            min_priority,
            drop_below: true,
        }
    }

    /// The gate's priority threshold.
    pub fn min_priority(&self) -> u8 {
        self.min_priority
    }
}

#[async_trait]
impl Filter for LevelFilter {
    fn name(&self) -> &str {
        "level"
    }

    async fn filter(&self, event: LogEvent) -> Result<Option<LogEvent>, PipelineError> {
        if !self.drop_below {
            return Ok(Some(event));
        }
        if self.registry.priority(&event.level) < self.min_priority {
            return Ok(None);
        }
        Ok(Some(event))
    }
}
