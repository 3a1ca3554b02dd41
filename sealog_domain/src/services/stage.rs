// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Stage Contracts
//!
//! Service traits for the ordered event pipeline: filters, enrichers,
//! redactors, and byte-level processors. Stage failures are contained by
//! the worker; a failing stage is skipped and the event continues with the
//! last good snapshot.
//!
//! ## Execution Order
//!
//! 1. **Filters** - sequential, declared order; any may drop the event
//! 2. **Enrichers** - parallel with bounded concurrency; each contributes a
//!    metadata fragment merged shallowly in declaration order
//! 3. **Redactors** - strictly sequential, declared order
//! 4. **Processors** - strictly sequential, operate on serialized bytes
//!
//! ## Contracts
//!
//! - Filters receive an owned event and return `None` to drop it or the
//!   (possibly transformed) event to continue
//! - Enrichers receive a shared view and return only their contribution;
//!   an enricher that must serialize internal state (the tamper enricher)
//!   does so behind its own lock
//! - Redactors receive an owned event and return the transformed event
//! - Processors receive serialized bytes and return replacement bytes

use crate::entities::LogEvent;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Configuration snapshot an adaptive-sampling filter advertises so the
/// filter ladder can tighten it under pressure without knowing the concrete
/// type.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveSamplingSpec {
    pub target_eps: f64,
    pub min_sample_rate: f64,
    pub max_sample_rate: f64,
    pub window_seconds: f64,
    pub always_pass_levels: Vec<String>,
    pub smoothing_factor: f64,
}

/// Contract for filters that can drop or transform events before enrichment.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Stable filter name for diagnostics and per-plugin metrics.
    fn name(&self) -> &str;

    /// Initializes filter resources (optional).
    async fn start(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Releases filter resources (optional).
    async fn stop(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Returns `None` to drop the event, or the event to continue.
    async fn filter(&self, event: LogEvent) -> Result<Option<LogEvent>, PipelineError>;

    /// Advertised by adaptive-sampling filters so the escalation ladder can
    /// rebuild a tightened copy.
    fn adaptive_config(&self) -> Option<AdaptiveSamplingSpec> {
        None
    }

    /// Reports filter health.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Contract for enrichers contributing metadata fragments.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Stable enricher name for diagnostics and per-plugin metrics.
    fn name(&self) -> &str;

    /// Initializes enricher resources (optional).
    async fn start(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Persists and releases enricher resources (optional).
    async fn stop(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Returns metadata fields merged shallowly into the event. A failed
    /// enricher contributes nothing.
    async fn enrich(&self, event: &LogEvent) -> Result<Map<String, Value>, PipelineError>;
}

/// Contract for redactors transforming events before sink emission.
#[async_trait]
pub trait Redactor: Send + Sync {
    /// Stable redactor name for diagnostics and per-plugin metrics.
    fn name(&self) -> &str;

    /// Initializes redactor resources (optional).
    async fn start(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Releases redactor resources (optional).
    async fn stop(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Returns the redacted event. Redaction must be idempotent: applying
    /// the same redactor twice yields the same bytes as applying it once.
    async fn redact(&self, event: LogEvent) -> Result<LogEvent, PipelineError>;
}

/// Contract for byte-level processors mutating the serialized form.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable processor name for diagnostics and per-plugin metrics.
    fn name(&self) -> &str;

    /// Returns the replacement bytes. A failing processor falls back to its
    /// input bytes.
    async fn process(&self, bytes: &[u8]) -> Result<Vec<u8>, PipelineError>;
}
