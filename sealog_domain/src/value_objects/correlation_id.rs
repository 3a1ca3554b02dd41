// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Correlation ID Value Object
//!
//! Opaque request-tracing identifier attached to every envelope. Generated
//! as a v4 UUID (hex-hyphenated) when the call site does not supply one.
//! The only invariant is non-emptiness; callers may thread externally-issued
//! identifiers straight through.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, non-empty correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh v4 UUID correlation id (hex-hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an externally-issued identifier, rejecting empty strings.
    pub fn parse(value: impl Into<String>) -> Result<Self, PipelineError> {
        let value = value.into();
        if value.is_empty() {
            return Err(PipelineError::ValidationError(
                "correlation_id must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the value object, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
