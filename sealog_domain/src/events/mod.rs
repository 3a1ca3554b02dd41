// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain events published by the pipeline runtime.

pub mod pipeline_events;

pub use pipeline_events::{CircuitState, CircuitStateChanged, PressureChanged, WorkerPoolScaled};
