// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Log Level Registry
//!
//! This module provides the registered level table for the logging pipeline.
//! The default table carries the standard five levels plus the conventional
//! aliases; users may register additional levels with priorities 0-99 before
//! the first logger is constructed, after which the registry is frozen.
//!
//! ## Overview
//!
//! - **Default levels**: DEBUG=10, INFO=20, WARNING=30 (alias WARN),
//!   ERROR=40, CRITICAL=50 (alias FATAL)
//! - **Custom levels**: priorities 0-99, registered before freeze
//! - **Freeze semantics**: the first logger construction freezes the table;
//!   later registration attempts fail with a configuration error
//! - **Unknown levels**: resolve to the INFO priority (20) so malformed
//!   events still route sensibly
//!
//! The registry is an explicit value wired at construction; there is no
//! process-wide mutable level table.

use crate::error::PipelineError;
use std::collections::HashMap;

/// Priority assigned to unknown level names.
pub const DEFAULT_PRIORITY: u8 = 20;

/// Highest priority a registered level may carry.
pub const MAX_PRIORITY: u8 = 99;

/// Default level table: name -> numeric priority.
pub const DEFAULT_LEVELS: [(&str, u8); 7] = [
    ("DEBUG", 10),
    ("INFO", 20),
    ("WARNING", 30),
    ("WARN", 30), // alias
    ("ERROR", 40),
    ("CRITICAL", 50),
    ("FATAL", 50), // alias
];

/// Registered level table, frozen on first logger construction.
///
/// Cheap to clone; loggers hold their own frozen copy so that concurrent
/// lookups need no synchronization.
#[derive(Debug, Clone)]
pub struct LevelRegistry {
    levels: HashMap<String, u8>,
    frozen: bool,
}

impl LevelRegistry {
    /// Creates a registry populated with the default level table.
    pub fn with_defaults() -> Self {
        let levels = DEFAULT_LEVELS
            .iter()
            .map(|(name, priority)| ((*name).to_string(), *priority))
            .collect();
        Self {
            levels,
            frozen: false,
        }
    }

    /// Registers a custom level.
    ///
    /// Must be called before any logger is created from this registry. The
    /// name is uppercased; priorities outside 0-99 and duplicate names are
    /// rejected.
    pub fn register(&mut self, name: &str, priority: u8) -> Result<(), PipelineError> {
        if self.frozen {
            return Err(PipelineError::invalid_config(
                "cannot register levels after a logger has been created",
            ));
        }
        if priority > MAX_PRIORITY {
            return Err(PipelineError::ValidationError(format!(
                "level priority must be 0-{}, got {}",
                MAX_PRIORITY, priority
            )));
        }
        let upper = name.to_uppercase();
        if upper.is_empty() {
            return Err(PipelineError::ValidationError(
                "level name must not be empty".to_string(),
            ));
        }
        if self.levels.contains_key(&upper) {
            return Err(PipelineError::ValidationError(format!(
                "level '{}' already exists",
                upper
            )));
        }
        self.levels.insert(upper, priority);
        Ok(())
    }

    /// Freezes the registry, preventing further registration.
    ///
    /// Called automatically when the first logger is constructed.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns true when no new levels can be registered.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the priority for a level name (case-insensitive).
    ///
    /// Unknown levels resolve to [`DEFAULT_PRIORITY`].
    pub fn priority(&self, level: &str) -> u8 {
        self.levels
            .get(&level.to_uppercase())
            .copied()
            .unwrap_or(DEFAULT_PRIORITY)
    }

    /// Returns true when the level name is registered.
    pub fn contains(&self, level: &str) -> bool {
        self.levels.contains_key(&level.to_uppercase())
    }

    /// Returns all registered levels and their priorities.
    pub fn all(&self) -> &HashMap<String, u8> {
        &self.levels
    }

    /// Returns the registered level with the minimum priority among the
    /// given names, used by the critical filter gate.
    pub fn min_priority_of<'a, I>(&self, names: I) -> Option<(String, u8)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(|name| (name.to_uppercase(), self.priority(name)))
            .min_by_key(|(_, priority)| *priority)
    }
}

impl Default for LevelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
