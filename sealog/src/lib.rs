// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Sealog
//!
//! A structured, asynchronous logging pipeline with adaptive pressure
//! control and tamper-evident sealing, built with Rust.
//!
//! ## Architecture Overview
//!
//! The pipeline follows Clean Architecture layering:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Logger facade, producer API, drain, composition root)     │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (Envelope, level registry, canonical JSON, ports)          │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Queues, pressure monitor, filter ladder, worker pool,     │
//! │   sinks, circuit breakers, tamper sealing, metrics)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Concepts
//!
//! ### Bounded Pipeline
//! Producers submit into a dual bounded queue (ordinary + protected
//! traffic) under a configurable backpressure policy. Workers drain
//! batches and run an ordered pipeline of filters, enrichers, redactors,
//! and byte-level processors before fanning out to sinks, each guarded by
//! a circuit breaker with a stderr fallback of last resort.
//!
//! ### Adaptive Pressure Control
//! A monitor samples queue fill and walks a four-level hysteresis ladder
//! (NORMAL, ELEVATED, HIGH, CRITICAL). Level changes swap the active
//! filter tuple, scale the worker pool, resize batches, and - at
//! CRITICAL - shed ordinary traffic entirely.
//!
//! ### Tamper-Evident Sealing
//! An integrity enricher attaches a per-event MAC (HMAC-SHA256 or
//! Ed25519), a monotonic sequence, and a SHA-256 hash chain; the sealed
//! sink wrapper accumulates per-file metadata and emits signed manifests
//! on rotation, so any removal, reorder, or edit of the sealed output is
//! detectable offline.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealog::{fields, Logger, LoggerSettings, PipelineComponents, StdoutJsonSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sealog::PipelineError> {
//!     let logger = Logger::start(
//!         LoggerSettings::named("app"),
//!         vec![Arc::new(StdoutJsonSink::new())],
//!         PipelineComponents::default(),
//!     )
//!     .await?;
//!
//!     logger.bind("service", "checkout".into());
//!     logger.info("service started");
//!     logger.warning_with("slow request", fields! {"latency_ms" => 1250});
//!
//!     let result = logger.stop_and_drain().await;
//!     println!("processed {} events", result.processed);
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod infrastructure;

// Re-export the domain layer
pub use sealog_domain::{
    AdaptiveSummary, BatchPolicy, CircuitState, CorrelationId, DrainResult, EnvelopeBuilder,
    ExceptionLimits, LevelDurations, LevelRegistry, LogEvent, PipelineError, PressureLevel,
    SerializedView, Sink, SinkCapabilities, WorkerCount,
};

// Re-export the primary application surface
pub use application::{build_key_provider, Logger, PipelineComponents};
pub use infrastructure::config::{
    CoreSettings, KeySource, LoggerSettings, PressureSettings, RoutingSettings, TamperAlgorithm,
    TamperSettings,
};
pub use infrastructure::sinks::{
    FanoutWriter, JsonFileSink, RedactMode, RoutingRule, StdoutJsonSink,
};
pub use infrastructure::tamper::{IntegrityEnricher, SealedSink};

// Re-exported for the `fields!` macro expansion; not public API.
#[doc(hidden)]
pub use serde_json as __serde_json;

/// Builds a `serde_json::Map` of call-site extras.
///
/// ```rust
/// let extras = sealog::fields! {"user" => "alice", "attempt" => 3};
/// assert_eq!(extras.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    {$($key:expr => $value:expr),* $(,)?} => {{
        let mut map = $crate::__serde_json::Map::new();
        $(map.insert($key.to_string(), $crate::__serde_json::Value::from($value));)*
        map
    }};
}
