// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Info Enricher
//!
//! Stamps service identity onto every event: service name, deployment
//! environment, version, host, and process id. Values come from the
//! `SEALOG_SERVICE` / `SEALOG_ENV` / `SEALOG_VERSION` environment variables;
//! absent values are omitted rather than emitted as nulls.

use async_trait::async_trait;
use sealog_domain::services::stage::Enricher;
use sealog_domain::{LogEvent, PipelineError};
use serde_json::{Map, Value};

/// Adds service, environment, version, host, and pid metadata.
pub struct RuntimeInfoEnricher {
    fields: Map<String, Value>,
}

impl RuntimeInfoEnricher {
    /// Captures runtime identity once at construction; enrichment is then a
    /// cheap clone per event.
    pub fn new() -> Self {
        let mut fields = Map::new();
        fields.insert(
            "service".to_string(),
            Value::String(std::env::var("SEALOG_SERVICE").unwrap_or_else(|_| "sealog".to_string())),
        );
        fields.insert(
            "env".to_string(),
            Value::String(
                std::env::var("SEALOG_ENV")
                    .or_else(|_| std::env::var("ENV"))
                    .unwrap_or_else(|_| "dev".to_string()),
            ),
        );
        if let Ok(version) = std::env::var("SEALOG_VERSION") {
            fields.insert("version".to_string(), Value::String(version));
        }
        if let Ok(host) = std::env::var("HOSTNAME") {
            fields.insert("host".to_string(), Value::String(host));
        }
        fields.insert("pid".to_string(), Value::from(std::process::id()));
        Self { fields }
    }
}

impl Default for RuntimeInfoEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enricher for RuntimeInfoEnricher {
    fn name(&self) -> &str {
        "runtime_info"
    }

    async fn enrich(&self, _event: &LogEvent) -> Result<Map<String, Value>, PipelineError> {
        Ok(self.fields.clone())
    }
}
