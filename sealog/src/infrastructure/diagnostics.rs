// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Diagnostics Channel
//!
//! Rate-limited internal warning channel used by pipeline components to
//! report problems without re-entering the logging pipeline.
//!
//! ## Design
//!
//! - **Container-scoped**: each logger owns one channel; there is no global
//!   diagnostics state
//! - **Bounded, non-blocking**: `warn` never blocks and never panics; when
//!   the channel is full the record is counted as dropped
//! - **Rate-limited**: keyed by `(component, message)` with a small window
//!   so a hot failure path cannot flood stderr
//! - **Never re-enters the pipeline**: the writer task emits single JSON
//!   lines directly to stderr
//!
//! Components hold a cheap clone; the writer task exits when the last clone
//! is dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default bounded channel capacity.
const CHANNEL_CAPACITY: usize = 256;

/// Default suppression window per (component, message) key.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5);

/// One internal warning record.
#[derive(Debug, Clone)]
pub struct DiagnosticRecord {
    pub component: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

struct DiagnosticsInner {
    tx: mpsc::Sender<DiagnosticRecord>,
    last_emit: Mutex<HashMap<(String, String), Instant>>,
    window: Duration,
    dropped: AtomicU64,
    suppressed: AtomicU64,
}

/// Rate-limited internal warning channel.
///
/// Cheap to clone; a disabled instance turns every call into a no-op.
#[derive(Clone)]
pub struct Diagnostics {
    inner: Option<Arc<DiagnosticsInner>>,
}

impl Diagnostics {
    /// Creates a disabled channel; every `warn` is a no-op.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Creates a stderr-backed channel and spawns its writer task.
    ///
    /// Must be called from within a tokio runtime. The writer exits when
    /// the last `Diagnostics` clone is dropped.
    pub fn stderr() -> Self {
        Self::with_window(RATE_LIMIT_WINDOW)
    }

    /// Creates a stderr-backed channel with a custom suppression window.
    pub fn with_window(window: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<DiagnosticRecord>(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                write_record(&record);
            }
        });
        Self {
            inner: Some(Arc::new(DiagnosticsInner {
                tx,
                last_emit: Mutex::new(HashMap::new()),
                window,
                dropped: AtomicU64::new(0),
                suppressed: AtomicU64::new(0),
            })),
        }
    }

    /// Reports an internal problem. Never blocks, never panics.
    ///
    /// Records sharing a `(component, message)` key within the suppression
    /// window are counted but not emitted.
    pub fn warn(&self, component: &str, message: &str, fields: &[(&str, &str)]) {
        let Some(inner) = &self.inner else {
            return;
        };

        let key = (component.to_string(), message.to_string());
        {
            let mut last_emit = inner.last_emit.lock();
            let now = Instant::now();
            if let Some(last) = last_emit.get(&key) {
                if now.duration_since(*last) < inner.window {
                    inner.suppressed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
            last_emit.insert(key, now);
        }

        let record = DiagnosticRecord {
            component: component.to_string(),
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        };
        if inner.tx.try_send(record).is_err() {
            inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records dropped because the bounded channel was full.
    pub fn dropped_count(&self) -> u64 {
        self.inner
            .as_ref()
            .map(|inner| inner.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Records suppressed by the rate limiter.
    pub fn suppressed_count(&self) -> u64 {
        self.inner
            .as_ref()
            .map(|inner| inner.suppressed.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Writes one record as a JSON line to stderr. Failures are ignored; the
/// diagnostics channel has nowhere else to report.
fn write_record(record: &DiagnosticRecord) {
    let mut map = serde_json::Map::new();
    map.insert(
        "component".to_string(),
        serde_json::Value::String(record.component.clone()),
    );
    map.insert(
        "message".to_string(),
        serde_json::Value::String(record.message.clone()),
    );
    for (key, value) in &record.fields {
        map.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    if let Ok(line) = serde_json::to_string(&serde_json::Value::Object(map)) {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }
}
