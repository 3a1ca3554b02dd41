// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pipeline runtime: bounded queues, the pressure monitor, the adaptive
//! filter ladder, the worker pool, and the pipeline worker itself.

pub mod filter_ladder;
pub mod pressure;
pub mod queue;
pub mod worker;
pub mod worker_pool;

pub use filter_ladder::{FilterLadder, FilterTuple};
pub use pressure::{ActuatorStats, EscalationLadder, PressureCallback, PressureMonitor};
pub use queue::{DualQueue, RingQueue};
pub use worker::{FlushSignal, PipelineCounters, Worker, WorkerContext};
pub use worker_pool::{scale_factor, StopFlag, WorkerFactory, WorkerPool};
