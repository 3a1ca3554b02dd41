// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Manages graceful shutdown across application components.
//!
//! ## Design Pattern
//!
//! The shutdown machinery provides:
//! - **Cancellation tokens** for propagating shutdown signals to tasks
//! - **Drain registry** - the single process-wide holder: a weak registry of
//!   loggers drained on exit or on a fatal signal, each with a bounded wait
//! - **Drain guard** - RAII handle that drains registered loggers when the
//!   process leaves `main`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealog_bootstrap::shutdown::{CancellationToken, DrainRegistry};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let token = CancellationToken::new();
//!     let worker_token = token.clone();
//!
//!     tokio::spawn(async move {
//!         worker_token.cancelled().await;
//!         // flush and exit
//!     });
//!
//!     // Later: signal the tasks and drain every registered logger
//!     token.cancel();
//!     DrainRegistry::global()
//!         .drain_all(Duration::from_secs(2))
//!         .await;
//! }
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;

/// Default grace period for graceful shutdown (in seconds)
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 2;

/// Cancellation token for signaling shutdown
///
/// Lightweight clone-able token that can be passed to async tasks.
#[derive(Clone)]
pub struct CancellationToken {
    /// Shared cancellation flag
    cancelled: Arc<AtomicBool>,
    /// Notification for waiters
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancel this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled (non-blocking)
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation (async)
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the re-check so a cancel between the check
            // and the await cannot be missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A component that can be drained on shutdown.
///
/// Loggers implement this; the registry holds them weakly so registration
/// never extends a logger's lifetime.
#[async_trait]
pub trait Drainable: Send + Sync {
    /// Component name for shutdown diagnostics.
    fn name(&self) -> &str;

    /// Stops producers, flushes in-flight work, and releases resources.
    /// Must be safe to call more than once.
    async fn drain(&self);
}

/// Weak registry of drainable components.
///
/// The only unavoidable process-wide holder in the system: exit and signal
/// handlers need a way to find live loggers. Everything else is wired
/// explicitly at construction.
pub struct DrainRegistry {
    entries: Mutex<Vec<Weak<dyn Drainable>>>,
}

static GLOBAL_REGISTRY: Lazy<DrainRegistry> = Lazy::new(|| DrainRegistry {
    entries: Mutex::new(Vec::new()),
});

impl DrainRegistry {
    /// Returns the process-wide registry.
    pub fn global() -> &'static DrainRegistry {
        &GLOBAL_REGISTRY
    }

    /// Creates an isolated registry (used by tests).
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Registers a component for automatic drain on shutdown.
    ///
    /// Dead weak references are pruned opportunistically on each call.
    pub fn register(&self, component: Weak<dyn Drainable>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|entry| entry.strong_count() > 0);
            entries.push(component);
        }
    }

    /// Unregisters a component, typically after an explicit drain so exit
    /// handlers do not drain it a second time.
    pub fn unregister(&self, component: &Weak<dyn Drainable>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|entry| !entry.ptr_eq(component) && entry.strong_count() > 0);
        }
    }

    /// Number of live registered components.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }

    /// True when no live components are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains every live registered component with a per-component timeout.
    ///
    /// Best-effort: a component that exceeds the timeout is abandoned and
    /// the next one is drained.
    pub async fn drain_all(&self, timeout: Duration) {
        let components: Vec<Arc<dyn Drainable>> = {
            match self.entries.lock() {
                Ok(entries) => entries.iter().filter_map(Weak::upgrade).collect(),
                Err(_) => return,
            }
        };

        for component in components {
            let name = component.name().to_string();
            match tokio::time::timeout(timeout, component.drain()).await {
                Ok(()) => tracing::debug!("drained '{}'", name),
                Err(_) => tracing::warn!("drain of '{}' exceeded {:?}", name, timeout),
            }
        }
    }
}

impl Default for DrainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that drains registered loggers when dropped.
///
/// The Rust counterpart of an exit handler: hold one in `main` and every
/// registered logger is drained (bounded) when `main` returns, panics, or
/// unwinds past the guard.
pub struct DrainGuard {
    timeout: Duration,
    disarmed: AtomicBool,
}

impl DrainGuard {
    /// Creates a guard with the given per-logger drain timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            disarmed: AtomicBool::new(false),
        }
    }

    /// Disarms the guard; no drain occurs on drop.
    pub fn disarm(&self) {
        self.disarmed.store(true, Ordering::SeqCst);
    }
}

impl Default for DrainGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS))
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.disarmed.load(Ordering::SeqCst) || DrainRegistry::global().is_empty() {
            return;
        }
        let timeout = self.timeout;
        // Drop may run inside or outside a tokio runtime; drain on a fresh
        // single-threaded runtime in a scoped thread either way.
        let result = std::thread::Builder::new()
            .name("sealog-drain".to_string())
            .spawn(move || {
                if let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    runtime.block_on(DrainRegistry::global().drain_all(timeout));
                }
            });
        if let Ok(handle) = result {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct TestDrainable {
        drained: AtomicUsize,
    }

    #[async_trait]
    impl Drainable for TestDrainable {
        fn name(&self) -> &str {
            "test"
        }

        async fn drain(&self) {
            self.drained.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancellation_token_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_token_cancelled_already() {
        let token = CancellationToken::new();
        token.cancel();

        // Should return immediately
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_token_cancelled_wait() {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token_clone.cancel();
        });

        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_registry_drains_live_components() {
        let registry = DrainRegistry::new();
        let component: Arc<TestDrainable> = Arc::new(TestDrainable {
            drained: AtomicUsize::new(0),
        });
        let weak: Weak<dyn Drainable> = {
            let arc: Arc<dyn Drainable> = component.clone();
            Arc::downgrade(&arc)
        };
        registry.register(weak);
        assert_eq!(registry.len(), 1);

        registry.drain_all(Duration::from_secs(1)).await;
        assert_eq!(component.drained.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registry_skips_dropped_components() {
        let registry = DrainRegistry::new();
        {
            let component: Arc<dyn Drainable> = Arc::new(TestDrainable {
                drained: AtomicUsize::new(0),
            });
            registry.register(Arc::downgrade(&component));
            // component dropped here
        }
        registry.drain_all(Duration::from_secs(1)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_unregister() {
        let registry = DrainRegistry::new();
        let component: Arc<dyn Drainable> = Arc::new(TestDrainable {
            drained: AtomicUsize::new(0),
        });
        let weak = Arc::downgrade(&component);
        registry.register(weak.clone());
        assert_eq!(registry.len(), 1);
        registry.unregister(&weak);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_bounds_a_hanging_drain() {
        struct HangingDrainable;

        #[async_trait]
        impl Drainable for HangingDrainable {
            fn name(&self) -> &str {
                "hanging"
            }

            async fn drain(&self) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }

        let registry = DrainRegistry::new();
        let component: Arc<dyn Drainable> = Arc::new(HangingDrainable);
        registry.register(Arc::downgrade(&component));

        // A component that never finishes draining is abandoned after the
        // per-component timeout instead of stalling shutdown
        let result = tokio::time::timeout(
            Duration::from_millis(500),
            registry.drain_all(Duration::from_millis(50)),
        )
        .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_drain_guard_disarm() {
        let guard = DrainGuard::new(Duration::from_millis(50));
        guard.disarm();
        drop(guard); // must not hang or panic
    }
}
