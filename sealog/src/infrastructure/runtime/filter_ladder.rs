// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adaptive Filter Ladder
//!
//! Pre-builds one immutable filter tuple per pressure level at startup;
//! the pressure monitor swaps the active tuple on level changes and
//! workers re-read the active pointer on each batch iteration, so the hot
//! path takes no lock beyond a read-guarded pointer clone.
//!
//! ## Escalation Ladder
//!
//! - **NORMAL** - user-configured filters verbatim
//! - **ELEVATED** - tighten adaptive sampling (halve target_eps) or inject
//!   one at 50 eps when the user has none
//! - **HIGH** - prepend a WARNING-level gate (drops DEBUG/INFO post-dequeue)
//! - **CRITICAL** - replace everything with a gate at the minimum priority
//!   among the protected levels; with no protected levels, block everything

use crate::infrastructure::filters::adaptive_sampling::{
    AdaptiveSamplingConfig, AdaptiveSamplingFilter,
};
use crate::infrastructure::filters::level::{LevelFilter, LevelFilterConfig};
use parking_lot::RwLock;
use sealog_domain::services::stage::Filter;
use sealog_domain::value_objects::log_level::MAX_PRIORITY;
use sealog_domain::{LevelRegistry, PressureLevel};
use std::collections::HashSet;
use std::sync::Arc;

/// One immutable tuple of filters.
pub type FilterTuple = Arc<Vec<Arc<dyn Filter>>>;

/// Pre-built per-level filter tuples with a swappable active pointer.
pub struct FilterLadder {
    tuples: [FilterTuple; 4],
    active: RwLock<(PressureLevel, FilterTuple)>,
}

impl FilterLadder {
    /// Pre-builds the four filter tuples.
    pub fn build(
        base_filters: Vec<Arc<dyn Filter>>,
        protected_levels: &HashSet<String>,
        registry: &LevelRegistry,
    ) -> Self {
        let normal: FilterTuple = Arc::new(base_filters);
        let elevated = Self::build_elevated(&normal, protected_levels);
        let high = Self::build_high(&normal, registry);
        let critical = Self::build_critical(protected_levels, registry);

        let tuples = [normal.clone(), elevated, high, critical];
        Self {
            tuples,
            active: RwLock::new((PressureLevel::Normal, normal)),
        }
    }

    /// ELEVATED: tighten or inject adaptive sampling.
    fn build_elevated(base: &FilterTuple, protected_levels: &HashSet<String>) -> FilterTuple {
        let mut result: Vec<Arc<dyn Filter>> = Vec::with_capacity(base.len() + 1);
        let mut found_adaptive = false;

        for filter in base.iter() {
            match filter.adaptive_config() {
                Some(spec) => {
                    found_adaptive = true;
                    let mut always_pass: HashSet<String> =
                        spec.always_pass_levels.iter().cloned().collect();
                    always_pass.extend(protected_levels.iter().cloned());
                    let mut always_pass: Vec<String> = always_pass.into_iter().collect();
                    always_pass.sort();
                    result.push(Arc::new(AdaptiveSamplingFilter::new(
                        AdaptiveSamplingConfig {
                            target_eps: spec.target_eps / 2.0,
                            min_sample_rate: spec.min_sample_rate,
                            max_sample_rate: spec.max_sample_rate,
                            window_seconds: spec.window_seconds,
                            always_pass_levels: always_pass,
                            smoothing_factor: spec.smoothing_factor,
                        },
                    )));
                }
                None => result.push(filter.clone()),
            }
        }

        if !found_adaptive {
            let mut always_pass: Vec<String> = protected_levels.iter().cloned().collect();
            always_pass.sort();
            result.push(Arc::new(AdaptiveSamplingFilter::new(
                AdaptiveSamplingConfig {
                    target_eps: 50.0,
                    always_pass_levels: always_pass,
                    ..AdaptiveSamplingConfig::default()
                },
            )));
        }

        Arc::new(result)
    }

    /// HIGH: inject a WARNING-level gate before the user filters.
    fn build_high(base: &FilterTuple, registry: &LevelRegistry) -> FilterTuple {
        let mut result: Vec<Arc<dyn Filter>> = Vec::with_capacity(base.len() + 1);
        result.push(Arc::new(LevelFilter::new(
            LevelFilterConfig {
                min_level: "WARNING".to_string(),
                drop_below: true,
            },
            registry.clone(),
        )));
        result.extend(base.iter().cloned());
        Arc::new(result)
    }

    /// CRITICAL: allow only protected levels (or nothing when the
    /// protected set is empty).
    fn build_critical(protected_levels: &HashSet<String>, registry: &LevelRegistry) -> FilterTuple {
        let gate: Arc<dyn Filter> =
            match registry.min_priority_of(protected_levels.iter().map(String::as_str)) {
                Some((name, _)) => Arc::new(LevelFilter::new(
                    LevelFilterConfig {
                        min_level: name,
                        drop_below: true,
                    },
                    registry.clone(),
                )),
                // No protected levels: a gate above the maximum priority
                // blocks every event.
                None => Arc::new(LevelFilter::with_priority(
                    MAX_PRIORITY.saturating_add(1),
                    registry.clone(),
                )),
            };
        Arc::new(vec![gate])
    }

    /// Currently active filter tuple; workers call this once per batch
    /// iteration.
    pub fn active(&self) -> FilterTuple {
        self.active.read().1.clone()
    }

    /// Currently active level.
    pub fn active_level(&self) -> PressureLevel {
        self.active.read().0
    }

    /// Installs the tuple for `level`; returns true when it changed.
    pub fn swap_to(&self, level: PressureLevel) -> bool {
        let mut active = self.active.write();
        if active.0 == level {
            return false;
        }
        *active = (level, self.tuples[level.index()].clone());
        true
    }

    /// Pre-built tuple for a level (inspection and tests).
    pub fn tuple_for(&self, level: PressureLevel) -> FilterTuple {
        self.tuples[level.index()].clone()
    }
}
