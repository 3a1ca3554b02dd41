// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Policy Value Object
//!
//! Bounds for worker batch accumulation: a batch flushes when it reaches
//! `max_size` events or when `timeout` elapses after the first event was
//! dequeued, whichever comes first. The adaptive controller resizes the
//! effective max under pressure; this value object carries the configured
//! baseline and the resize arithmetic.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batch accumulation bounds for a pipeline worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    max_size: usize,
    timeout_ms: u64,
}

impl BatchPolicy {
    /// Default maximum events per batch.
    pub const DEFAULT_MAX_SIZE: usize = 256;

    /// Default batch timeout in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 250;

    /// Creates a batch policy, rejecting degenerate bounds.
    pub fn new(max_size: usize, timeout: Duration) -> Result<Self, PipelineError> {
        if max_size == 0 {
            return Err(PipelineError::ValidationError(
                "batch_max_size must be > 0".to_string(),
            ));
        }
        if timeout.is_zero() {
            return Err(PipelineError::ValidationError(
                "batch_timeout must be > 0".to_string(),
            ));
        }
        Ok(Self {
            max_size,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Maximum events per batch.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Flush deadline measured from the first event of a batch.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pressure-scaled batch size: `max_size x factor`, clamped to
    /// `[max_size, ceiling]`. Larger batches amortize per-flush overhead
    /// while the pipeline is saturated.
    pub fn scaled_size(&self, factor: f64, ceiling: usize) -> usize {
        let raw = (self.max_size as f64 * factor).ceil() as usize;
        raw.clamp(self.max_size, ceiling.max(self.max_size))
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_size: Self::DEFAULT_MAX_SIZE,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}
