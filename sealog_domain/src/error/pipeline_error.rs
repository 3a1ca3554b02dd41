// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the sealog logging
//! pipeline domain. It categorizes failures, provides actionable error
//! messages, and supports both automated error containment and human-readable
//! diagnostics.
//!
//! ## Overview
//!
//! The error system is designed around Domain-Driven Design principles:
//!
//! - **Domain-Specific**: Errors are tailored to logging-pipeline concepts
//! - **Hierarchical**: Errors are organized into logical categories for
//!   systematic handling
//! - **Actionable**: Each error provides sufficient context for debugging and
//!   recovery
//! - **Contained**: Pipeline-internal errors never escape to producer call
//!   sites; only construction-time configuration errors surface synchronously
//!
//! ## Error Categories
//!
//! #### Configuration Errors
//! - **InvalidConfiguration**: Malformed or inconsistent logger settings
//! - **ValidationError**: Value-object constraint violations
//!
//! #### Pipeline Errors
//! - **QueueFull**: Bounded queue refused an event under backpressure
//! - **ProcessingFailed**: General stage execution failures
//! - **SerializationError**: Envelope serialization failures
//! - **SinkError**: Sink write or lifecycle failures
//!
//! #### Integrity Errors
//! - **IntegrityError**: Chain or MAC verification failures
//! - **KeyError**: Missing, malformed, or unusable key material
//!
//! #### Infrastructure Errors
//! - **IoError**: File system failures (chain state, manifests, sinks)
//! - **TimeoutError**: Bounded waits that expired
//! - **Cancelled**: Drain or shutdown interrupted an operation
//!
//! ## Error Handling Strategy
//!
//! Stage failures inside the pipeline are converted to diagnostics and the
//! event continues with the last good snapshot; `PipelineError` values cross
//! module boundaries, never producer boundaries.

use thiserror::Error;

/// Domain-specific errors for the logging pipeline system.
///
/// Each variant includes a descriptive message and is designed to provide
/// clear information about what went wrong and potentially how to fix it.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Actionable**: Error messages provide enough context for debugging
/// - **Categorized**: Errors are grouped by type for systematic handling
/// - **Cloneable**: Errors can be carried into diagnostics without cost
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Integrity check failed: {0}")]
    IntegrityError(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new processing error
    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// Creates a new serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Creates a new sink error
    pub fn sink_error(msg: impl Into<String>) -> Self {
        Self::SinkError(msg.into())
    }

    /// Creates a new integrity error
    pub fn integrity_error(msg: impl Into<String>) -> Self {
        Self::IntegrityError(msg.into())
    }

    /// Creates a new key error
    pub fn key_error(msg: impl Into<String>) -> Self {
        Self::KeyError(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout_error(msg: impl Into<String>) -> Self {
        Self::TimeoutError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Returns the error category name used by diagnostics and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) | Self::ValidationError(_) => "configuration",
            Self::QueueFull(_) => "backpressure",
            Self::ProcessingFailed(_) => "processing",
            Self::SerializationError(_) => "serialization",
            Self::SinkError(_) => "sink",
            Self::IntegrityError(_) | Self::KeyError(_) => "integrity",
            Self::IoError(_) => "io",
            Self::TimeoutError(_) => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::MetricsError(_) => "metrics",
            Self::Unsupported(_) => "unsupported",
            Self::InternalError(_) => "internal",
        }
    }

    /// Returns true when the failure indicates a temporary condition that a
    /// caller may retry (bounded queues, timeouts, transient I/O).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull(_) | Self::TimeoutError(_) | Self::IoError(_)
        )
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = PipelineError::invalid_config("worker_count must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: worker_count must be > 0"
        );
    }

    #[test]
    fn test_error_category_mapping() {
        assert_eq!(PipelineError::key_error("missing").category(), "integrity");
        assert_eq!(
            PipelineError::QueueFull("main".into()).category(),
            "backpressure"
        );
        assert_eq!(PipelineError::sink_error("boom").category(), "sink");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::QueueFull("main".into()).is_retryable());
        assert!(PipelineError::timeout_error("drain").is_retryable());
        assert!(!PipelineError::invalid_config("bad").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }
}
