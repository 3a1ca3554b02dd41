// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fallback Writer
//!
//! Last-resort emission path: when every configured sink fails (or is
//! circuit-open) for an event, a single line goes to stderr so the record
//! is not silently lost.
//!
//! ## Redaction Modes
//!
//! - **inherit**: the event already passed the configured redactor chain;
//!   emit as-is
//! - **minimal**: mask values of a fixed set of sensitive field names
//!   (case-insensitive, recursive through maps and lists) with `***`
//! - **none**: raw emission, with a diagnostic warning each time
//!
//! The output target is trait-abstracted so tests can capture lines; the
//! production target is stderr.

use crate::infrastructure::diagnostics::Diagnostics;
use sealog_domain::LogEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

/// Field names masked by minimal redaction (matched case-insensitively).
pub const FALLBACK_SENSITIVE_FIELDS: [&str; 14] = [
    "password",
    "passwd",
    "secret",
    "api_key",
    "apikey",
    "token",
    "access_token",
    "refresh_token",
    "authorization",
    "cookie",
    "session",
    "private_key",
    "ssn",
    "credit_card",
];

/// Recursion bound for minimal redaction on pathological input.
const MAX_REDACT_DEPTH: usize = 32;

/// Redaction applied to fallback output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedactMode {
    /// The redactor chain already ran on the event; emit as-is.
    Inherit,
    /// Mask the fixed sensitive field set with `***`.
    #[default]
    Minimal,
    /// Raw emission; a diagnostic fires on every use.
    None,
}

/// Output target for fallback lines.
pub trait FallbackOutput: Send + Sync {
    /// Writes one line (newline appended by the implementation).
    fn write_line(&self, line: &str);
}

/// Production output: stderr with per-line flush.
pub struct StderrOutput;

impl FallbackOutput for StderrOutput {
    fn write_line(&self, line: &str) {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }
}

/// Applies minimal redaction: masks sensitive field values recursively.
pub fn minimal_redact(value: &Value, sensitive: &HashSet<String>, depth: usize) -> Value {
    if depth >= MAX_REDACT_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, nested) in map {
                if sensitive.contains(&key.to_lowercase()) {
                    out.insert(key.clone(), Value::String("***".to_string()));
                } else {
                    out.insert(key.clone(), minimal_redact(nested, sensitive, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| minimal_redact(item, sensitive, depth + 1))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Emits events to the fallback output with the configured redaction.
pub struct FallbackWriter {
    output: Arc<dyn FallbackOutput>,
    mode: RedactMode,
    sensitive: HashSet<String>,
    diagnostics: Diagnostics,
}

impl FallbackWriter {
    /// Creates a fallback writer over the given output target.
    ///
    /// `extra_sensitive` extends the built-in sensitive field set for
    /// minimal redaction.
    pub fn new(
        output: Arc<dyn FallbackOutput>,
        mode: RedactMode,
        extra_sensitive: &[String],
        diagnostics: Diagnostics,
    ) -> Self {
        let mut sensitive: HashSet<String> = FALLBACK_SENSITIVE_FIELDS
            .iter()
            .map(|field| field.to_string())
            .collect();
        sensitive.extend(extra_sensitive.iter().map(|field| field.to_lowercase()));
        Self {
            output,
            mode,
            sensitive,
            diagnostics,
        }
    }

    /// Creates the production stderr fallback writer.
    pub fn stderr(mode: RedactMode, extra_sensitive: &[String], diagnostics: Diagnostics) -> Self {
        Self::new(Arc::new(StderrOutput), mode, extra_sensitive, diagnostics)
    }

    /// Emits one event. Never fails; an unserializable event degrades to a
    /// message-only record.
    pub fn emit(&self, event: &LogEvent) {
        let value = match self.mode {
            RedactMode::Inherit => event.to_value(),
            RedactMode::Minimal => minimal_redact(&event.to_value(), &self.sensitive, 0),
            RedactMode::None => {
                self.diagnostics.warn(
                    "sink",
                    "fallback triggered without redaction configured",
                    &[],
                );
                event.to_value()
            }
        };
        let line = serde_json::to_string(&value)
            .unwrap_or_else(|_| format!("{{\"message\":{:?}}}", event.message));
        self.output.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Map};

    pub(crate) struct CaptureOutput {
        pub lines: Mutex<Vec<String>>,
    }

    impl FallbackOutput for CaptureOutput {
        fn write_line(&self, line: &str) {
            self.lines.lock().push(line.to_string());
        }
    }

    fn event_with_secrets() -> LogEvent {
        let mut metadata = Map::new();
        metadata.insert("password".to_string(), json!("hunter2"));
        metadata.insert("api_key".to_string(), json!("sk-123"));
        metadata.insert(
            "nested".to_string(),
            json!({"TOKEN": "t-1", "ok": "visible"}),
        );
        LogEvent {
            timestamp: 1.0,
            level: "ERROR".to_string(),
            message: "boom".to_string(),
            logger: "root".to_string(),
            correlation_id: "c".to_string(),
            metadata,
        }
    }

    #[test]
    fn test_minimal_redaction_masks_sensitive_values() {
        let capture = Arc::new(CaptureOutput {
            lines: Mutex::new(Vec::new()),
        });
        let writer = FallbackWriter::new(
            capture.clone(),
            RedactMode::Minimal,
            &[],
            Diagnostics::disabled(),
        );
        writer.emit(&event_with_secrets());

        let lines = capture.lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].contains("hunter2"));
        assert!(!lines[0].contains("sk-123"));
        assert!(!lines[0].contains("t-1"));
        assert!(lines[0].contains("visible"));
        assert!(lines[0].contains("***"));
    }

    #[test]
    fn test_inherit_mode_emits_as_is() {
        let capture = Arc::new(CaptureOutput {
            lines: Mutex::new(Vec::new()),
        });
        let writer = FallbackWriter::new(
            capture.clone(),
            RedactMode::Inherit,
            &[],
            Diagnostics::disabled(),
        );
        writer.emit(&event_with_secrets());
        assert!(capture.lines.lock()[0].contains("hunter2"));
    }

    #[test]
    fn test_extra_sensitive_fields_extend_the_set() {
        let capture = Arc::new(CaptureOutput {
            lines: Mutex::new(Vec::new()),
        });
        let writer = FallbackWriter::new(
            capture.clone(),
            RedactMode::Minimal,
            &["tenant_secret".to_string()],
            Diagnostics::disabled(),
        );
        let mut event = event_with_secrets();
        event
            .metadata
            .insert("tenant_secret".to_string(), json!("classified"));
        writer.emit(&event);
        assert!(!capture.lines.lock()[0].contains("classified"));
    }

    #[test]
    fn test_minimal_redact_recurses_lists() {
        let sensitive: HashSet<String> = ["password".to_string()].into_iter().collect();
        let value = json!({"accounts": [{"password": "a"}, {"password": "b"}]});
        let redacted = minimal_redact(&value, &sensitive, 0);
        assert_eq!(redacted["accounts"][0]["password"], "***");
        assert_eq!(redacted["accounts"][1]["password"], "***");
    }
}
