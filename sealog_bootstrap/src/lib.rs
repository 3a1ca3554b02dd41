// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and provides the process-level
//! plumbing the logging pipeline needs:
//!
//! - **Shutdown coordination** - cancellation tokens and grace periods
//! - **Drain registry** - the single process-wide holder: a weak registry of
//!   loggers drained on exit or fatal signal
//! - **Signal handling** - SIGINT/SIGTERM with drain-then-reraise semantics
//! - **Exit codes** - Unix exit code mapping
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          BOOTSTRAP (This Module)            │
//! │  - Drain Registry                           │
//! │  - Signal Handling                          │
//! │  - Shutdown Coordination                    │
//! │  - Exit Codes                               │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │         APPLICATION LAYER                   │
//! │  - Logger Facade, Drain                     │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │           DOMAIN LAYER                      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Key Design Principles
//!
//! 1. **Separation from Enterprise Layers**
//!    - Bootstrap can be depended on by the application layer
//!    - Enterprise layers never reach back into bootstrap internals
//!
//! 2. **Graceful Shutdown**
//!    - Signal handlers drain registered loggers with a bounded wait
//!    - The default handler is restored and the signal re-raised so the
//!      process exits with the conventional 128+N status
//!
//! 3. **Testability**
//!    - Signal handling behind the `SystemSignals` trait
//!    - Registry instances can be created in isolation for tests

pub mod exit_code;
pub mod shutdown;
pub mod signals;

// Re-export key types
pub use exit_code::ExitCode;
pub use shutdown::{
    CancellationToken, DrainGuard, DrainRegistry, Drainable, DEFAULT_GRACE_PERIOD_SECS,
};
pub use signals::{create_signal_handler, install_drain_handler, SystemSignals};
