// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Field Mask Redactor
//!
//! Masks configured metadata fields by dot-separated path. Traversal is
//! bounded in depth and total keys scanned so pathological event shapes
//! cannot stall a worker. Masking is idempotent: a field already holding
//! the mask string is left untouched, so applying the redactor twice
//! produces the same bytes as applying it once.
//!
//! Paths are rooted at the envelope's metadata map; a path segment applied
//! to a list is applied to every element.

use crate::infrastructure::diagnostics::Diagnostics;
use async_trait::async_trait;
use sealog_domain::services::stage::Redactor;
use sealog_domain::{LogEvent, PipelineError};
use serde_json::Value;

/// Configuration for [`FieldMaskRedactor`].
#[derive(Debug, Clone)]
pub struct FieldMaskConfig {
    /// Dot-separated metadata paths to mask (e.g. `user.password`).
    pub fields_to_mask: Vec<String>,
    /// Replacement value written over masked fields.
    pub mask_string: String,
    /// Maximum traversal depth.
    pub max_depth: usize,
    /// Maximum keys scanned per event.
    pub max_keys_scanned: usize,
}

impl Default for FieldMaskConfig {
    fn default() -> Self {
        Self {
            fields_to_mask: Vec::new(),
            mask_string: "***".to_string(),
            max_depth: 16,
            max_keys_scanned: 1000,
        }
    }
}

/// Masks configured fields in structured events.
pub struct FieldMaskRedactor {
    paths: Vec<Vec<String>>,
    mask: String,
    max_depth: usize,
    max_scanned: usize,
    diagnostics: Diagnostics,
}

impl FieldMaskRedactor {
    /// Creates a field mask redactor.
    pub fn new(config: FieldMaskConfig, diagnostics: Diagnostics) -> Self {
        Self {
            paths: config
                .fields_to_mask
                .iter()
                .map(|path| {
                    path.split('.')
                        .filter(|segment| !segment.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .filter(|segments: &Vec<String>| !segments.is_empty())
                .collect(),
            mask: config.mask_string,
            max_depth: config.max_depth,
            max_scanned: config.max_keys_scanned,
            diagnostics,
        }
    }

    fn apply_path(&self, root: &mut Value, path: &[String]) {
        let mut scanned = 0usize;
        self.traverse(root, path, 0, 0, &mut scanned);
    }

    fn traverse(
        &self,
        container: &mut Value,
        path: &[String],
        segment: usize,
        depth: usize,
        scanned: &mut usize,
    ) {
        if depth > self.max_depth {
            self.diagnostics.warn(
                "redactor",
                "max depth exceeded during redaction",
                &[("path", &path.join("."))],
            );
            return;
        }
        if *scanned > self.max_scanned {
            self.diagnostics.warn(
                "redactor",
                "max keys scanned exceeded during redaction",
                &[("path", &path.join("."))],
            );
            return;
        }
        if segment >= path.len() {
            return;
        }

        match container {
            Value::Object(map) => {
                *scanned += 1;
                let key = &path[segment];
                if !map.contains_key(key) {
                    return;
                }
                if segment == path.len() - 1 {
                    if let Some(value) = map.get_mut(key) {
                        // Idempotence: do not re-mask an already-masked value
                        if value.as_str() != Some(self.mask.as_str()) {
                            *value = Value::String(self.mask.clone());
                        }
                    }
                } else if let Some(next) = map.get_mut(key) {
                    if next.is_object() || next.is_array() {
                        self.traverse(next, path, segment + 1, depth + 1, scanned);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    *scanned += 1;
                    self.traverse(item, path, segment, depth + 1, scanned);
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Redactor for FieldMaskRedactor {
    fn name(&self) -> &str {
        "field-mask"
    }

    async fn redact(&self, mut event: LogEvent) -> Result<LogEvent, PipelineError> {
        if self.paths.is_empty() {
            return Ok(event);
        }
        let mut root = Value::Object(std::mem::take(&mut event.metadata));
        for path in &self.paths {
            self.apply_path(&mut root, path);
        }
        if let Value::Object(map) = root {
            event.metadata = map;
        }
        Ok(event)
    }
}
