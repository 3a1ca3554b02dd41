// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Log Event Envelope
//!
//! This module provides the canonical event record (`LogEvent`) and the
//! envelope builder that produces it from a producer call site.
//!
//! ## Envelope Shape
//!
//! ```text
//! {"timestamp": <float seconds>, "level": "INFO", "message": "...",
//!  "logger": "root", "correlation_id": "...",
//!  "metadata": { ... user fields ..., "integrity": { ... } }}
//! ```
//!
//! ## Invariants
//!
//! - `level` belongs to the registered level set (enforced at the producer)
//! - `correlation_id` is non-empty; a fresh v4 UUID is generated when absent
//! - `metadata` never contains the reserved envelope keys
//! - the envelope is a value: once enqueued it is only mutated by the
//!   pipeline stages that own it
//!
//! ## Construction Rules
//!
//! Bound context merges into metadata first, then call-site extras (extras
//! win on collision). Exception details are serialized into bounded
//! `error.*` fields; a failure while serializing an exception drops the
//! exception fields, never the event.

use crate::value_objects::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved envelope keys that must never appear inside `metadata`.
pub const RESERVED_KEYS: [&str; 6] = [
    "timestamp",
    "level",
    "message",
    "logger",
    "correlation_id",
    "metadata",
];

/// Metadata key carrying the tamper-evidence block.
pub const INTEGRITY_KEY: &str = "integrity";

/// The in-memory value representing one log record before sink emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// UTC wall-clock seconds since the epoch at call time.
    pub timestamp: f64,
    /// Registered level name (uppercase).
    pub level: String,
    /// Human-readable message.
    pub message: String,
    /// Logger name the event was produced through.
    pub logger: String,
    /// Opaque request-tracing identifier.
    pub correlation_id: String,
    /// Ordered user metadata: bound context, call-site extras, serialized
    /// exception fields, and enricher contributions.
    pub metadata: Map<String, Value>,
}

impl LogEvent {
    /// Returns the integrity block attached by the tamper enricher, if any.
    pub fn integrity(&self) -> Option<&Map<String, Value>> {
        self.metadata.get(INTEGRITY_KEY).and_then(Value::as_object)
    }

    /// Converts the envelope into a JSON value tree.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("timestamp".to_string(), json_f64(self.timestamp));
        map.insert("level".to_string(), Value::String(self.level.clone()));
        map.insert("message".to_string(), Value::String(self.message.clone()));
        map.insert("logger".to_string(), Value::String(self.logger.clone()));
        map.insert(
            "correlation_id".to_string(),
            Value::String(self.correlation_id.clone()),
        );
        map.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        Value::Object(map)
    }
}

/// Converts an f64 into a JSON number, substituting 0 for non-finite input.
fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::Number(0.into()))
}

/// Bounds applied to serialized exception fields.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionLimits {
    /// Whether exception serialization is enabled at all.
    pub enabled: bool,
    /// Maximum entries carried in `error.chain`.
    pub max_frames: usize,
    /// Maximum characters carried in `error.stack`.
    pub max_stack_chars: usize,
}

impl Default for ExceptionLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            max_frames: 50,
            max_stack_chars: 20_000,
        }
    }
}

/// Produces canonical event records from producer call sites.
///
/// The builder is cheap to clone and carries only per-logger configuration;
/// per-call inputs (level, message, extras, exception) arrive as arguments.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    logger_name: String,
    limits: ExceptionLimits,
}

impl EnvelopeBuilder {
    /// Creates a builder for the named logger.
    pub fn new(logger_name: impl Into<String>, limits: ExceptionLimits) -> Self {
        Self {
            logger_name: logger_name.into(),
            limits,
        }
    }

    /// Returns the logger name stamped onto produced envelopes.
    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    /// Builds a fully-populated envelope.
    ///
    /// Bound context merges first, then extras (extras win on collision);
    /// reserved envelope keys are silently discarded from both.
    pub fn build(
        &self,
        level: &str,
        message: &str,
        bound_context: &Map<String, Value>,
        extras: Option<Map<String, Value>>,
        correlation_id: Option<String>,
    ) -> LogEvent {
        let mut metadata = Map::new();
        merge_metadata(&mut metadata, bound_context.clone());
        if let Some(extras) = extras {
            merge_metadata(&mut metadata, extras);
        }

        let correlation_id = correlation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| CorrelationId::generate().into_string());

        LogEvent {
            timestamp: now_timestamp(),
            level: level.to_uppercase(),
            message: message.to_string(),
            logger: self.logger_name.clone(),
            correlation_id,
            metadata,
        }
    }

    /// Builds an envelope with serialized exception fields.
    ///
    /// `type_name` is the concrete error type's name as captured at the call
    /// site. The source chain is bounded by `max_frames` and the backtrace
    /// string by `max_stack_chars`.
    pub fn build_with_error(
        &self,
        level: &str,
        message: &str,
        bound_context: &Map<String, Value>,
        extras: Option<Map<String, Value>>,
        correlation_id: Option<String>,
        type_name: &str,
        error: &(dyn std::error::Error + 'static),
        backtrace: Option<String>,
    ) -> LogEvent {
        let mut event = self.build(level, message, bound_context, extras, correlation_id);
        if self.limits.enabled {
            for (key, value) in serialize_error(type_name, error, backtrace, &self.limits) {
                event.metadata.insert(key, value);
            }
        }
        event
    }
}

/// Merges `incoming` into `metadata`, dropping reserved envelope keys.
fn merge_metadata(metadata: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        metadata.insert(key, value);
    }
}

/// UTC wall clock as float seconds since the epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Serializes an error into bounded `error.*` metadata fields.
fn serialize_error(
    type_name: &str,
    error: &(dyn std::error::Error + 'static),
    backtrace: Option<String>,
    limits: &ExceptionLimits,
) -> Vec<(String, Value)> {
    let mut fields = Vec::with_capacity(4);
    fields.push((
        "error.type".to_string(),
        Value::String(type_name.to_string()),
    ));
    fields.push((
        "error.message".to_string(),
        Value::String(error.to_string()),
    ));

    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        if chain.len() >= limits.max_frames {
            break;
        }
        chain.push(Value::String(cause.to_string()));
        source = cause.source();
    }
    if !chain.is_empty() {
        fields.push(("error.chain".to_string(), Value::Array(chain)));
    }

    if let Some(stack) = backtrace {
        let bounded: String = stack.chars().take(limits.max_stack_chars).collect();
        fields.push(("error.stack".to_string(), Value::String(bounded)));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct LeafError;

    impl fmt::Display for LeafError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "leaf failure")
        }
    }

    impl std::error::Error for LeafError {}

    #[derive(Debug)]
    struct WrapError(LeafError);

    impl fmt::Display for WrapError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped failure")
        }
    }

    impl std::error::Error for WrapError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new("root", ExceptionLimits::default())
    }

    #[test]
    fn test_extras_win_over_bound_context() {
        let mut bound = Map::new();
        bound.insert("tenant".to_string(), Value::String("alpha".into()));
        bound.insert("region".to_string(), Value::String("us-east".into()));
        let mut extras = Map::new();
        extras.insert("tenant".to_string(), Value::String("beta".into()));

        let event = builder().build("INFO", "hello", &bound, Some(extras), None);
        assert_eq!(event.metadata["tenant"], Value::String("beta".into()));
        assert_eq!(event.metadata["region"], Value::String("us-east".into()));
    }

    #[test]
    fn test_reserved_keys_never_enter_metadata() {
        let mut extras = Map::new();
        extras.insert("level".to_string(), Value::String("DEBUG".into()));
        extras.insert("message".to_string(), Value::String("spoof".into()));
        extras.insert("ok".to_string(), Value::Bool(true));

        let event = builder().build("INFO", "hello", &Map::new(), Some(extras), None);
        assert!(!event.metadata.contains_key("level"));
        assert!(!event.metadata.contains_key("message"));
        assert!(event.metadata.contains_key("ok"));
    }

    #[test]
    fn test_correlation_id_generated_when_absent() {
        let event = builder().build("INFO", "hello", &Map::new(), None, None);
        assert!(!event.correlation_id.is_empty());

        let event = builder().build(
            "INFO",
            "hello",
            &Map::new(),
            None,
            Some("req-42".to_string()),
        );
        assert_eq!(event.correlation_id, "req-42");
    }

    #[test]
    fn test_level_is_uppercased() {
        let event = builder().build("warning", "hello", &Map::new(), None, None);
        assert_eq!(event.level, "WARNING");
    }

    #[test]
    fn test_error_fields_are_bounded() {
        let limits = ExceptionLimits {
            enabled: true,
            max_frames: 1,
            max_stack_chars: 5,
        };
        let builder = EnvelopeBuilder::new("root", limits);
        let err = WrapError(LeafError);
        let event = builder.build_with_error(
            "ERROR",
            "boom",
            &Map::new(),
            None,
            None,
            "WrapError",
            &err,
            Some("0123456789".to_string()),
        );
        assert_eq!(event.metadata["error.type"], Value::String("WrapError".into()));
        assert_eq!(
            event.metadata["error.message"],
            Value::String("wrapped failure".into())
        );
        assert_eq!(
            event.metadata["error.chain"],
            Value::Array(vec![Value::String("leaf failure".into())])
        );
        assert_eq!(event.metadata["error.stack"], Value::String("01234".into()));
    }

    #[test]
    fn test_exceptions_disabled_drops_error_fields() {
        let limits = ExceptionLimits {
            enabled: false,
            ..ExceptionLimits::default()
        };
        let builder = EnvelopeBuilder::new("root", limits);
        let err = LeafError;
        let event = builder.build_with_error(
            "ERROR",
            "boom",
            &Map::new(),
            None,
            None,
            "LeafError",
            &err,
            None,
        );
        assert!(!event.metadata.contains_key("error.type"));
    }

    #[test]
    fn test_to_value_round_trip() {
        let event = builder().build("INFO", "hello", &Map::new(), None, None);
        let value = event.to_value();
        assert_eq!(value["level"], Value::String("INFO".into()));
        assert_eq!(value["logger"], Value::String("root".into()));
        assert!(value["timestamp"].is_number());
    }
}
