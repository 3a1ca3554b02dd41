// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Size Guard Processor
//!
//! Byte-level processor that replaces serialized envelopes above a size
//! limit with a compact well-formed marker record. Protects downstream
//! sinks with hard payload limits from oversized metadata.

use async_trait::async_trait;
use sealog_domain::services::canonical;
use sealog_domain::services::stage::Processor;
use sealog_domain::PipelineError;
use serde_json::{Map, Value};

/// Replaces oversized serialized envelopes with a marker record.
pub struct SizeGuardProcessor {
    max_bytes: usize,
}

impl SizeGuardProcessor {
    /// Creates a guard with the given byte ceiling.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes.max(64),
        }
    }
}

#[async_trait]
impl Processor for SizeGuardProcessor {
    fn name(&self) -> &str {
        "size_guard"
    }

    async fn process(&self, bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
        if bytes.len() <= self.max_bytes {
            return Ok(bytes.to_vec());
        }
        let mut map = Map::new();
        map.insert(
            "message".to_string(),
            Value::String("envelope exceeded size limit".to_string()),
        );
        map.insert("original_size".to_string(), Value::from(bytes.len()));
        map.insert("size_limit".to_string(), Value::from(self.max_bytes));
        map.insert("truncated".to_string(), Value::Bool(true));
        canonical::canonicalize(&Value::Object(map))
    }
}
