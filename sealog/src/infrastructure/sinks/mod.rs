// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Sink infrastructure: built-in sinks, per-sink circuit breakers, the
//! fan-out/routing writer, and the stderr fallback path.

pub mod circuit_breaker;
pub mod fallback;
pub mod fanout;
pub mod json_file;
pub mod stdout_json;

pub use circuit_breaker::{CircuitBreakerConfig, SinkCircuitBreaker, StateChangeListener};
pub use fallback::{FallbackOutput, FallbackWriter, RedactMode, StderrOutput};
pub use fanout::{FanoutWriter, RoutingRule};
pub use json_file::JsonFileSink;
pub use stdout_json::StdoutJsonSink;
