// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sealog Domain
//!
//! Pure domain layer for the sealog structured logging pipeline. This crate
//! contains the business logic shared by every runtime component: the event
//! envelope and its builder, the level registry, pressure and batching value
//! objects, domain events, canonical serialization for signing, and the
//! ports (service traits) the infrastructure layer implements.
//!
//! ## Architecture
//!
//! The crate follows Domain-Driven Design layering:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Entities                                │
//! │  (LogEvent envelope, DrainResult, AdaptiveSummary)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Value Objects                             │
//! │  (LevelRegistry, CorrelationId, PressureLevel,              │
//! │   WorkerCount, BatchPolicy)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 Domain Services & Ports                     │
//! │  (canonical JSON, Sink, Filter/Enricher/Redactor/           │
//! │   Processor, KeyProvider)                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Domain Events                             │
//! │  (PressureChanged, CircuitStateChanged, WorkerPoolScaled)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! No runtime, I/O, or metrics dependencies live here: the domain compiles
//! against `serde`, hashing, and encoding only. Infrastructure ports that
//! are inherently I/O-bound (sinks, key providers) are async traits; pure
//! computations (canonicalization, chain hashing) are synchronous.

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod value_objects;

// Re-export commonly used types at the crate root
pub use entities::{
    AdaptiveSummary, DrainResult, EnvelopeBuilder, ExceptionLimits, LevelDurations, LogEvent,
};
pub use error::PipelineError;
pub use events::{CircuitState, CircuitStateChanged, PressureChanged, WorkerPoolScaled};
pub use services::{SerializedView, Sink, SinkCapabilities};
pub use value_objects::{BatchPolicy, CorrelationId, LevelRegistry, PressureLevel, WorkerCount};
