// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stdout JSONL Sink
//!
//! Writes one JSON line per event to stdout. Supports the zero-copy
//! serialized path. Each line is emitted under the process stdout lock, so
//! concurrent writers never interleave within a line; the blocking write
//! itself runs on the blocking thread pool so the worker loop never stalls
//! on a slow console or pipe.

use crate::infrastructure::serialization::serialize_envelope;
use async_trait::async_trait;
use sealog_domain::services::sink::{Sink, SinkCapabilities};
use sealog_domain::{LogEvent, PipelineError, SerializedView};
use std::io::Write;

/// Async-friendly stdout sink that writes structured JSON lines.
pub struct StdoutJsonSink;

impl StdoutJsonSink {
    /// Creates a stdout sink.
    pub fn new() -> Self {
        Self
    }

    /// Appends a newline and writes the whole line under the stdout lock
    /// on the blocking pool.
    async fn write_line(mut bytes: Vec<u8>) -> Result<(), PipelineError> {
        bytes.push(b'\n');
        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&bytes)?;
            handle.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::internal_error(format!("stdout write task failed: {}", e)))?
    }
}

impl Default for StdoutJsonSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutJsonSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            serialized_writes: true,
            rotation: false,
            health_check: false,
        }
    }

    async fn write(&self, event: &LogEvent) -> Result<(), PipelineError> {
        let view = serialize_envelope(event)?;
        Self::write_line(view.into_bytes()).await
    }

    async fn write_serialized(&self, view: &SerializedView) -> Result<(), PipelineError> {
        Self::write_line(view.bytes().to_vec()).await
    }
}
