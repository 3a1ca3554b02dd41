// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adaptive Sampling Filter
//!
//! Dynamically adjusts its sample rate to hold observed throughput near a
//! target events-per-second. The filter measures recent throughput over a
//! sliding window, computes the ideal rate, and converges toward it with
//! exponential smoothing so bursts do not whipsaw the rate.
//!
//! Events at always-pass levels (by default the protected error levels)
//! bypass sampling entirely.
//!
//! The filter advertises its configuration through `adaptive_config` so the
//! escalation ladder can rebuild a tightened copy (halved target) under
//! ELEVATED pressure.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sealog_domain::services::stage::{AdaptiveSamplingSpec, Filter};
use sealog_domain::{LogEvent, PipelineError};
use std::collections::{HashSet, VecDeque};
use std::time::Instant;

/// Configuration for [`AdaptiveSamplingFilter`].
#[derive(Debug, Clone)]
pub struct AdaptiveSamplingConfig {
    /// Target throughput in events per second.
    pub target_eps: f64,
    /// Floor for the computed sample rate.
    pub min_sample_rate: f64,
    /// Ceiling for the computed sample rate.
    pub max_sample_rate: f64,
    /// Sliding window over which throughput is measured.
    pub window_seconds: f64,
    /// Levels that bypass sampling.
    pub always_pass_levels: Vec<String>,
    /// Exponential smoothing factor in [0.0, 1.0].
    pub smoothing_factor: f64,
}

impl Default for AdaptiveSamplingConfig {
    fn default() -> Self {
        Self {
            target_eps: 100.0,
            min_sample_rate: 0.01,
            max_sample_rate: 1.0,
            window_seconds: 10.0,
            always_pass_levels: vec![
                "ERROR".to_string(),
                "CRITICAL".to_string(),
                "FATAL".to_string(),
            ],
            smoothing_factor: 0.3,
        }
    }
}

struct AdaptiveState {
    current_rate: f64,
    timestamps: VecDeque<Instant>,
    last_adjustment: Instant,
    rng: StdRng,
}

/// Dynamically adjusts sampling based on recent throughput.
pub struct AdaptiveSamplingFilter {
    target_eps: f64,
    min_rate: f64,
    max_rate: f64,
    window_seconds: f64,
    always_pass: HashSet<String>,
    smoothing: f64,
    state: Mutex<AdaptiveState>,
}

impl AdaptiveSamplingFilter {
    /// Creates an adaptive sampling filter; bounds are normalized so
    /// `min <= max` and all factors stay in their valid ranges.
    pub fn new(config: AdaptiveSamplingConfig) -> Self {
        let min_rate = config.min_sample_rate.clamp(0.0, 1.0);
        let max_rate = config.max_sample_rate.clamp(min_rate, 1.0);
        Self {
            target_eps: config.target_eps.max(0.0),
            min_rate,
            max_rate,
            window_seconds: config.window_seconds.max(0.001),
            always_pass: config
                .always_pass_levels
                .iter()
                .map(|level| level.to_uppercase())
                .collect(),
            smoothing: config.smoothing_factor.clamp(0.0, 1.0),
            state: Mutex::new(AdaptiveState {
                current_rate: 1.0,
                timestamps: VecDeque::new(),
                last_adjustment: Instant::now(),
                rng: StdRng::seed_from_u64(rand::random::<u64>()),
            }),
        }
    }

    /// Current effective sample rate.
    pub fn current_sample_rate(&self) -> f64 {
        self.state.lock().current_rate
    }

    fn record_event(state: &mut AdaptiveState, window_seconds: f64) {
        let now = Instant::now();
        state.timestamps.push_back(now);
        while let Some(oldest) = state.timestamps.front() {
            if now.duration_since(*oldest).as_secs_f64() > window_seconds {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn maybe_adjust_rate(&self, state: &mut AdaptiveState) {
        let now = Instant::now();
        if now.duration_since(state.last_adjustment).as_secs_f64() < 1.0 {
            return;
        }
        state.last_adjustment = now;

        let current_eps = match state.timestamps.front() {
            None => 0.0,
            Some(oldest) => {
                let elapsed = now.duration_since(*oldest).as_secs_f64().max(0.001);
                state.timestamps.len() as f64 / elapsed
            }
        };

        let ideal_rate = if current_eps <= 0.0 {
            self.max_rate
        } else {
            (self.target_eps / current_eps).clamp(self.min_rate, self.max_rate)
        };

        state.current_rate =
            self.smoothing * ideal_rate + (1.0 - self.smoothing) * state.current_rate;
    }
}

#[async_trait]
impl Filter for AdaptiveSamplingFilter {
    fn name(&self) -> &str {
        "adaptive_sampling"
    }

    async fn filter(&self, event: LogEvent) -> Result<Option<LogEvent>, PipelineError> {
        let level = event.level.to_uppercase();
        let mut state = self.state.lock();

        if self.always_pass.contains(&level) {
            Self::record_event(&mut state, self.window_seconds);
            return Ok(Some(event));
        }

        let roll: f64 = state.rng.random();
        if roll > state.current_rate {
            return Ok(None);
        }

        Self::record_event(&mut state, self.window_seconds);
        self.maybe_adjust_rate(&mut state);
        Ok(Some(event))
    }

    fn adaptive_config(&self) -> Option<AdaptiveSamplingSpec> {
        Some(AdaptiveSamplingSpec {
            target_eps: self.target_eps,
            min_sample_rate: self.min_rate,
            max_sample_rate: self.max_rate,
            window_seconds: self.window_seconds,
            always_pass_levels: {
                let mut levels: Vec<String> = self.always_pass.iter().cloned().collect();
                levels.sort();
                levels
            },
            smoothing_factor: self.smoothing,
        })
    }
}
