// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sink Contract
//!
//! Abstract destination for finalized log events. Sinks are non-blocking and
//! resilient: errors must be contained by the caller (the fan-out writer)
//! and must never crash the pipeline.
//!
//! ## Capabilities
//!
//! Optional abilities are advertised through [`SinkCapabilities`], checked
//! once at wiring time. The hot path never probes for optional behavior:
//! the fan-out writer precomputes, per sink, whether to hand over
//! pre-serialized bytes or the structured event.
//!
//! - `serialized_writes`: the sink accepts pre-serialized envelope bytes for
//!   zero-copy emission
//! - `rotation`: the sink owns an output file and supports `rotate()`
//! - `health_check`: the sink can report liveness

use crate::entities::LogEvent;
use crate::error::PipelineError;
use crate::services::canonical::SerializedView;
use async_trait::async_trait;
use std::path::PathBuf;

/// Optional abilities a sink advertises at wiring time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCapabilities {
    /// Accepts pre-serialized envelope bytes via `write_serialized`.
    pub serialized_writes: bool,
    /// Owns an output file and supports `rotate()`.
    pub rotation: bool,
    /// Implements a meaningful `health_check`.
    pub health_check: bool,
}

/// Abstract async sink interface.
///
/// Lifecycle: `start` is called once before the first write, `stop` once
/// after the last; `stop` must flush buffered output.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable sink name used by routing rules, circuit breakers, metrics
    /// labels, and diagnostics.
    fn name(&self) -> &str;

    /// Advertised optional abilities. Checked at wiring time only.
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::default()
    }

    /// Initializes sink resources.
    async fn start(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Flushes and releases sink resources.
    async fn stop(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Writes a single structured log event.
    async fn write(&self, event: &LogEvent) -> Result<(), PipelineError>;

    /// Writes a pre-serialized envelope (zero-copy path).
    ///
    /// Only called when `capabilities().serialized_writes` is true.
    async fn write_serialized(&self, _view: &SerializedView) -> Result<(), PipelineError> {
        Err(PipelineError::Unsupported(
            "sink does not support serialized writes".to_string(),
        ))
    }

    /// Reports sink liveness.
    async fn health_check(&self) -> bool {
        true
    }

    /// Closes the current output file and opens the next one.
    ///
    /// Only meaningful when `capabilities().rotation` is true.
    async fn rotate(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Path of the currently open output file, for rotation-aware wrappers.
    fn current_path(&self) -> Option<PathBuf> {
        None
    }
}
