// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Probabilistic Sampling Filter
//!
//! Passes events with a fixed probability. An optional seed makes the
//! decision sequence deterministic for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sealog_domain::services::stage::Filter;
use sealog_domain::{LogEvent, PipelineError};

/// Configuration for [`SamplingFilter`].
#[derive(Debug, Clone)]
pub struct SamplingFilterConfig {
    /// Pass probability in [0.0, 1.0].
    pub sample_rate: f64,
    /// Optional deterministic seed.
    pub seed: Option<u64>,
}

impl Default for SamplingFilterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            seed: None,
        }
    }
}

/// Probabilistic sampling filter.
pub struct SamplingFilter {
    rate: f64,
    rng: Mutex<StdRng>,
}

impl SamplingFilter {
    /// Creates a sampling filter; the rate is clamped to [0.0, 1.0].
    pub fn new(config: SamplingFilterConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random::<u64>);
        Self {
            rate: config.sample_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl Filter for SamplingFilter {
    fn name(&self) -> &str {
        "sampling"
    }

    async fn filter(&self, event: LogEvent) -> Result<Option<LogEvent>, PipelineError> {
        if self.rate >= 1.0 {
            return Ok(Some(event));
        }
        if self.rate <= 0.0 {
            return Ok(None);
        }
        let roll: f64 = self.rng.lock().random();
        Ok((roll < self.rate).then_some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn event() -> LogEvent {
        LogEvent {
            timestamp: 1.0,
            level: "INFO".to_string(),
            message: "m".to_string(),
            logger: "root".to_string(),
            correlation_id: "c".to_string(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_full_rate_passes_everything() {
        let filter = SamplingFilter::new(SamplingFilterConfig::default());
        for _ in 0..50 {
            assert!(filter.filter(event()).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_zero_rate_drops_everything() {
        let filter = SamplingFilter::new(SamplingFilterConfig {
            sample_rate: 0.0,
            seed: Some(7),
        });
        for _ in 0..50 {
            assert!(filter.filter(event()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_seeded_sequence_is_deterministic() {
        let make = || {
            SamplingFilter::new(SamplingFilterConfig {
                sample_rate: 0.5,
                seed: Some(42),
            })
        };
        let a = make();
        let b = make();
        for _ in 0..100 {
            let ra = a.filter(event()).await.unwrap().is_some();
            let rb = b.filter(event()).await.unwrap().is_some();
            assert_eq!(ra, rb);
        }
    }
}
