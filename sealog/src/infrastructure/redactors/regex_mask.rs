// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Regex Mask Redactor
//!
//! Masks substrings matching configured patterns in every string value of
//! the event (message and metadata). Used for secrets that travel inside
//! free-form text rather than under a known field name.
//!
//! Idempotence holds as long as no pattern matches the mask string itself;
//! patterns that do are rejected at construction.

use async_trait::async_trait;
use regex::Regex;
use sealog_domain::services::stage::Redactor;
use sealog_domain::{LogEvent, PipelineError};
use serde_json::Value;

/// Configuration for [`RegexMaskRedactor`].
#[derive(Debug, Clone)]
pub struct RegexMaskConfig {
    /// Regular expressions whose matches are replaced by the mask.
    pub patterns: Vec<String>,
    /// Replacement written over matches.
    pub mask_string: String,
}

impl Default for RegexMaskConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            mask_string: "***".to_string(),
        }
    }
}

/// Masks pattern matches inside string values.
pub struct RegexMaskRedactor {
    patterns: Vec<Regex>,
    mask: String,
}

impl RegexMaskRedactor {
    /// Traversal depth bound for nested metadata.
    const MAX_DEPTH: usize = 32;

    /// Compiles the configured patterns.
    ///
    /// Fails synchronously on an invalid pattern or on a pattern that would
    /// match the mask string (which would break idempotence).
    pub fn new(config: RegexMaskConfig) -> Result<Self, PipelineError> {
        let mut patterns = Vec::with_capacity(config.patterns.len());
        for raw in &config.patterns {
            let regex = Regex::new(raw).map_err(|e| {
                PipelineError::invalid_config(format!("invalid redaction pattern '{}': {}", raw, e))
            })?;
            if regex.is_match(&config.mask_string) {
                return Err(PipelineError::invalid_config(format!(
                    "redaction pattern '{}' matches the mask string",
                    raw
                )));
            }
            patterns.push(regex);
        }
        Ok(Self {
            patterns,
            mask: config.mask_string,
        })
    }

    fn mask_string_value(&self, text: &str) -> Option<String> {
        let mut current = text.to_string();
        let mut changed = false;
        for pattern in &self.patterns {
            if pattern.is_match(&current) {
                current = pattern
                    .replace_all(&current, self.mask.as_str())
                    .into_owned();
                changed = true;
            }
        }
        changed.then_some(current)
    }

    fn mask_value(&self, value: &mut Value, depth: usize) {
        if depth > Self::MAX_DEPTH {
            return;
        }
        match value {
            Value::String(text) => {
                if let Some(masked) = self.mask_string_value(text) {
                    *text = masked;
                }
            }
            Value::Object(map) => {
                for (_, nested) in map.iter_mut() {
                    self.mask_value(nested, depth + 1);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.mask_value(item, depth + 1);
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Redactor for RegexMaskRedactor {
    fn name(&self) -> &str {
        "regex-mask"
    }

    async fn redact(&self, mut event: LogEvent) -> Result<LogEvent, PipelineError> {
        if self.patterns.is_empty() {
            return Ok(event);
        }
        if let Some(masked) = self.mask_string_value(&event.message) {
            event.message = masked;
        }
        let mut root = Value::Object(std::mem::take(&mut event.metadata));
        self.mask_value(&mut root, 0);
        if let Value::Object(map) = root {
            event.metadata = map;
        }
        Ok(event)
    }
}
