// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fast Envelope Serialization
//!
//! Serializes finalized envelopes to JSON bytes for sink emission. Output
//! uses sorted keys and compact separators so a sealed event serializes to
//! exactly the bytes that verify against its MAC (minus the integrity block
//! exclusion, which only applies to MAC input).
//!
//! ## Failure Policy
//!
//! Serialization failures are governed by `strict_envelope_mode`:
//!
//! - **strict**: the event is dropped and counted; a diagnostic is emitted
//! - **best-effort**: the event is re-serialized through the lossy fallback
//!   (level, logger, message, timestamp only) and emission continues
//!
//! The policy decision itself lives in the worker; this module provides the
//! two serializers.

use sealog_domain::services::canonical;
use sealog_domain::{LogEvent, PipelineError, SerializedView};
use serde_json::{Map, Value};

/// Serializes an envelope to canonical JSON bytes for sink emission.
pub fn serialize_envelope(event: &LogEvent) -> Result<SerializedView, PipelineError> {
    let bytes = canonical::canonicalize(&event.to_value())?;
    Ok(SerializedView::new(bytes))
}

/// Lossy fallback serializer: emits only the scalar envelope fields, never
/// fails, and marks the record as degraded.
pub fn serialize_lossy(event: &LogEvent) -> SerializedView {
    let mut map = Map::new();
    map.insert(
        "correlation_id".to_string(),
        Value::String(event.correlation_id.clone()),
    );
    map.insert("level".to_string(), Value::String(event.level.clone()));
    map.insert("logger".to_string(), Value::String(event.logger.clone()));
    map.insert("lossy".to_string(), Value::Bool(true));
    map.insert("message".to_string(), Value::String(event.message.clone()));
    map.insert(
        "timestamp".to_string(),
        serde_json::Number::from_f64(event.timestamp)
            .map(Value::Number)
            .unwrap_or_else(|| Value::Number(0.into())),
    );
    let bytes = canonical::canonicalize(&Value::Object(map))
        .unwrap_or_else(|_| b"{\"lossy\":true}".to_vec());
    SerializedView::new(bytes)
}
