// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Signal Handling
//!
//! Cross-platform signal handling for graceful shutdown.
//!
//! ## Supported Signals
//!
//! - **SIGTERM** (15) - Graceful shutdown request (unix)
//! - **SIGINT** (2) - User interrupt (Ctrl+C)
//!
//! ## Design Pattern
//!
//! The signal handler provides:
//! - **Async signal handling** via tokio
//! - **Trait abstraction** for testing
//! - **Drain-then-reraise**: registered loggers are drained with a bounded
//!   wait, then the default handler is restored and the signal re-raised so
//!   the process keeps standard exit semantics (exit code 128+N)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealog_bootstrap::signals::install_drain_handler;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     install_drain_handler(Duration::from_secs(2));
//!     // Application work...
//! }
//! ```

use crate::shutdown::DrainRegistry;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Callback type for shutdown notification
pub type ShutdownCallback = Box<dyn FnOnce() + Send + 'static>;

/// System signal handling trait
///
/// Abstracts platform-specific signal handling for graceful shutdown.
pub trait SystemSignals: Send + Sync {
    /// Wait for a shutdown signal and invoke the callback
    ///
    /// This method blocks until SIGTERM or SIGINT is received, then invokes
    /// the provided callback to initiate graceful shutdown. Returns the raw
    /// signal number that fired.
    fn wait_for_signal(
        &self,
        on_shutdown: ShutdownCallback,
    ) -> Pin<Box<dyn Future<Output = i32> + Send + '_>>;
}

/// Unix signal handler implementation
///
/// Handles SIGTERM and SIGINT using tokio::signal.
#[cfg(unix)]
pub struct UnixSignalHandler;

#[cfg(unix)]
impl UnixSignalHandler {
    /// Create a new Unix signal handler
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Default for UnixSignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl SystemSignals for UnixSignalHandler {
    fn wait_for_signal(
        &self,
        on_shutdown: ShutdownCallback,
    ) -> Pin<Box<dyn Future<Output = i32> + Send + '_>> {
        Box::pin(async move {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!("failed to register SIGTERM handler: {}", err);
                    // Without a signal stream there is nothing to wait for.
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!("failed to register SIGINT handler: {}", err);
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            };

            let signum = tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    libc::SIGTERM
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    libc::SIGINT
                }
            };

            on_shutdown();
            signum
        })
    }
}

/// Windows signal handler implementation
///
/// Handles Ctrl+C; SIGTERM does not exist on Windows.
#[cfg(windows)]
pub struct WindowsSignalHandler;

#[cfg(windows)]
impl WindowsSignalHandler {
    /// Create a new Windows signal handler
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl Default for WindowsSignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
impl SystemSignals for WindowsSignalHandler {
    fn wait_for_signal(
        &self,
        on_shutdown: ShutdownCallback,
    ) -> Pin<Box<dyn Future<Output = i32> + Send + '_>> {
        Box::pin(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            on_shutdown();
            2 // SIGINT equivalent
        })
    }
}

/// Creates the platform signal handler.
pub fn create_signal_handler() -> Box<dyn SystemSignals> {
    #[cfg(unix)]
    {
        Box::new(UnixSignalHandler::new())
    }
    #[cfg(windows)]
    {
        Box::new(WindowsSignalHandler::new())
    }
}

/// Installs the drain-then-reraise signal handler.
///
/// Spawns a background task that waits for SIGINT/SIGTERM, drains every
/// logger in the global [`DrainRegistry`] with the given per-logger timeout,
/// then restores the default handler and re-raises the signal so the process
/// exits with the conventional 128+N status.
///
/// Must be called from within a tokio runtime.
pub fn install_drain_handler(drain_timeout: Duration) {
    tokio::spawn(async move {
        let handler = create_signal_handler();
        let signum = handler.wait_for_signal(Box::new(|| {})).await;

        DrainRegistry::global().drain_all(drain_timeout).await;

        reraise_default(signum);
    });
}

/// Restores the default disposition for `signum` and re-raises it.
#[cfg(unix)]
fn reraise_default(signum: i32) {
    // SAFETY: resetting a signal disposition and re-raising are async-signal
    // safe libc calls; the process is on its way out.
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

#[cfg(not(unix))]
fn reraise_default(signum: i32) {
    std::process::exit(128 + signum);
}
