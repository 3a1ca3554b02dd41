// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rotating JSONL File Sink
//!
//! Appends one JSON line per event to a uniquely-named output file and
//! rotates on request. Each generation gets its own file
//! (`<stem>-NNNNN.jsonl`), so a rotation-aware wrapper can name the closed
//! file in a manifest without racing the next generation.
//!
//! Durability: line writes happen under a short lock; fsync (when enabled)
//! runs on the blocking thread pool against a cloned handle so the worker
//! loop never blocks on disk.

use crate::infrastructure::serialization::serialize_envelope;
use async_trait::async_trait;
use parking_lot::Mutex;
use sealog_domain::services::sink::{Sink, SinkCapabilities};
use sealog_domain::{LogEvent, PipelineError, SerializedView};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

struct FileState {
    index: u64,
    path: PathBuf,
    file: Option<File>,
}

/// Rotating JSONL file sink.
pub struct JsonFileSink {
    name: String,
    dir: PathBuf,
    stem: String,
    fsync_on_write: bool,
    state: Mutex<FileState>,
}

impl JsonFileSink {
    /// Creates a file sink writing under `dir` with the given file stem.
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        stem: impl Into<String>,
        fsync_on_write: bool,
    ) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            stem: stem.into(),
            fsync_on_write,
            state: Mutex::new(FileState {
                index: 0,
                path: PathBuf::new(),
                file: None,
            }),
        }
    }

    fn file_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}-{:05}.jsonl", self.stem, index))
    }

    fn open_next(&self, state: &mut FileState) -> Result<(), PipelineError> {
        state.index += 1;
        let path = self.file_path(state.index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::io_error(format!("open {}: {}", path.display(), e)))?;
        state.path = path;
        state.file = Some(file);
        Ok(())
    }

    fn append_line(&self, bytes: &[u8]) -> Result<Option<File>, PipelineError> {
        let mut state = self.state.lock();
        let file = state.file.as_mut().ok_or_else(|| {
            PipelineError::sink_error(format!("sink '{}' is not started", self.name))
        })?;
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        if self.fsync_on_write {
            let clone = file.try_clone()?;
            return Ok(Some(clone));
        }
        Ok(None)
    }

    async fn sync_handle(handle: File) -> Result<(), PipelineError> {
        tokio::task::spawn_blocking(move || handle.sync_data())
            .await
            .map_err(|e| PipelineError::internal_error(format!("fsync task failed: {}", e)))?
            .map_err(PipelineError::from)
    }
}

#[async_trait]
impl Sink for JsonFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            serialized_writes: true,
            rotation: true,
            health_check: true,
        }
    }

    async fn start(&self) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            PipelineError::io_error(format!("create {}: {}", self.dir.display(), e))
        })?;
        let mut state = self.state.lock();
        if state.file.is_none() {
            self.open_next(&mut state)?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PipelineError> {
        let file = {
            let mut state = self.state.lock();
            state.file.take()
        };
        if let Some(file) = file {
            tokio::task::spawn_blocking(move || file.sync_all())
                .await
                .map_err(|e| PipelineError::internal_error(format!("fsync task failed: {}", e)))?
                .map_err(PipelineError::from)?;
        }
        Ok(())
    }

    async fn write(&self, event: &LogEvent) -> Result<(), PipelineError> {
        let view = serialize_envelope(event)?;
        self.write_serialized(&view).await
    }

    async fn write_serialized(&self, view: &SerializedView) -> Result<(), PipelineError> {
        if let Some(handle) = self.append_line(view.bytes())? {
            Self::sync_handle(handle).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.state.lock().file.is_some()
    }

    async fn rotate(&self) -> Result<(), PipelineError> {
        let closed = {
            let mut state = self.state.lock();
            let closed = state.file.take();
            self.open_next(&mut state)?;
            closed
        };
        if let Some(file) = closed {
            Self::sync_handle(file).await?;
        }
        Ok(())
    }

    fn current_path(&self) -> Option<PathBuf> {
        let state = self.state.lock();
        state.file.is_some().then(|| state.path.clone())
    }
}
