// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logger Facade
//!
//! The producer-facing surface of the pipeline and the composition root
//! that wires queue, pressure monitor, filter ladder, worker pool, sink
//! writer, and the tamper enricher together.
//!
//! ## Producer API
//!
//! - Per-level methods (`debug` .. `critical`) plus generic `log` for
//!   custom levels
//! - `bind`/`unbind`/`clear_context` for persistent bound context
//! - `exception` for events carrying serialized error details
//! - `flush` waits until every worker has flushed its current batch
//! - `stop_and_drain` returns a [`DrainResult`] with the event accounting
//!   and the adaptive summary
//!
//! Two submission entry points share the same bounded queue: the
//! thread-safe synchronous `log` family (bounded blocking wait under
//! backpressure, intended for producers on non-runtime threads) and
//! `log_async` for producers already on the runtime. Producer calls never
//! raise from pipeline internals; the only fallible call is construction.
//!
//! ## Adaptive Wiring
//!
//! Pressure level changes actuate, in order: the filter ladder swap, the
//! worker pool scaling, and the batch resize ladder (x1/x1/x2/x4); the
//! monitor itself manages main-queue shedding while CRITICAL with
//! protected backlog. Sink circuit breakers feed an open-circuit counter
//! that boosts the monitor's effective fill.

use crate::infrastructure::config::{KeySource, LoggerSettings, TamperSettings};
use crate::infrastructure::diagnostics::Diagnostics;
use crate::infrastructure::metrics::{drop_cause, MetricsCollector};
use crate::infrastructure::runtime::filter_ladder::FilterLadder;
use crate::infrastructure::runtime::pressure::PressureMonitor;
use crate::infrastructure::runtime::queue::DualQueue;
use crate::infrastructure::runtime::worker::{
    FlushSignal, PipelineCounters, Worker, WorkerContext,
};
use crate::infrastructure::runtime::worker_pool::{StopFlag, WorkerFactory, WorkerPool};
use crate::infrastructure::sinks::circuit_breaker::StateChangeListener;
use crate::infrastructure::sinks::fallback::FallbackWriter;
use crate::infrastructure::sinks::fanout::FanoutWriter;
use crate::infrastructure::tamper::enricher::IntegrityEnricher;
use crate::infrastructure::tamper::providers::{EnvKeyProvider, FileKeyProvider, KmsKeyProvider};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use sealog_bootstrap::{DrainRegistry, Drainable};
use sealog_domain::services::key_provider::{KeyProvider, KmsClient};
use sealog_domain::services::sink::Sink;
use sealog_domain::services::stage::{Enricher, Filter, Processor, Redactor};
use sealog_domain::{
    CircuitState, DrainResult, EnvelopeBuilder, ExceptionLimits, LevelRegistry, LogEvent,
    PipelineError, PressureLevel,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Polling interval for backpressure waits.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(1);

/// Batch resize multipliers per pressure level.
fn batch_factor(level: PressureLevel) -> f64 {
    match level {
        PressureLevel::Normal | PressureLevel::Elevated => 1.0,
        PressureLevel::High => 2.0,
        PressureLevel::Critical => 4.0,
    }
}

/// User-configured pipeline stages handed to [`Logger::start`].
#[derive(Default)]
pub struct PipelineComponents {
    pub filters: Vec<Arc<dyn Filter>>,
    pub enrichers: Vec<Arc<dyn Enricher>>,
    pub redactors: Vec<Arc<dyn Redactor>>,
    pub processors: Vec<Arc<dyn Processor>>,
    /// Remote client for KMS-style key sources; required when
    /// `tamper.key_source` is one of the remote variants.
    pub kms_client: Option<Arc<dyn KmsClient>>,
}

/// Builds the key provider selected by the tamper settings.
pub fn build_key_provider(
    settings: &TamperSettings,
    kms_client: Option<Arc<dyn KmsClient>>,
) -> Result<Arc<dyn KeyProvider>, PipelineError> {
    let ttl = Duration::from_secs(settings.key_cache_ttl_seconds);
    match settings.key_source {
        KeySource::Env => Ok(Arc::new(EnvKeyProvider::new(&settings.key_env_var, ttl))),
        KeySource::File => {
            let path = settings.key_file_path.as_ref().ok_or_else(|| {
                PipelineError::invalid_config("tamper.key_source = file requires key_file_path")
            })?;
            Ok(Arc::new(FileKeyProvider::new(path, ttl)))
        }
        KeySource::AwsKms | KeySource::GcpKms | KeySource::AzureKeyvault | KeySource::Vault => {
            let client = kms_client.ok_or_else(|| {
                PipelineError::invalid_config(
                    "remote key sources require a KmsClient in PipelineComponents",
                )
            })?;
            Ok(Arc::new(KmsKeyProvider::new(client, ttl)))
        }
    }
}

/// Generates the per-level producer methods from the default level table.
macro_rules! level_methods {
    ($(($name:ident, $with_name:ident, $level:expr)),* $(,)?) => {
        $(
            #[doc = concat!("Logs a message at ", $level, " level.")]
            pub fn $name(&self, message: &str) -> bool {
                self.log($level, message)
            }

            #[doc = concat!("Logs a message at ", $level, " level with extras.")]
            pub fn $with_name(&self, message: &str, extras: Map<String, Value>) -> bool {
                self.log_with($level, message, Some(extras))
            }
        )*
    };
}

struct LoggerCore {
    settings: LoggerSettings,
    registry: LevelRegistry,
    min_priority: u8,
    critical_priority: u8,
    builder: EnvelopeBuilder,
    bound_context: RwLock<Map<String, Value>>,
    queue: Arc<DualQueue>,
    counters: Arc<PipelineCounters>,
    flush: Arc<FlushSignal>,
    metrics: MetricsCollector,
    diagnostics: Diagnostics,
    monitor: Arc<PressureMonitor>,
    monitor_handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    pool: Arc<WorkerPool>,
    filters: Vec<Arc<dyn Filter>>,
    enrichers: Vec<Arc<dyn Enricher>>,
    redactors: Vec<Arc<dyn Redactor>>,
    sinks: Vec<Arc<dyn Sink>>,
    stopped: AtomicBool,
    drain_result: tokio::sync::Mutex<Option<DrainResult>>,
}

impl LoggerCore {
    fn flush_wanted(&self, level: &str) -> bool {
        self.settings.core.flush_on_critical
            && self.registry.priority(level) >= self.critical_priority
    }

    fn after_enqueue(&self, flush_critical: bool) {
        self.metrics
            .set_queue_high_watermark(self.queue.main_len() as i64);
        if flush_critical {
            self.flush.request();
        }
    }

    fn record_producer_drop(&self) {
        self.counters.inc_dropped();
        self.metrics.record_event_dropped(drop_cause::QUEUE_FULL);
    }

    /// Enqueue with the configured backpressure policy (blocking wait;
    /// intended for producers on non-runtime threads).
    fn submit(&self, event: LogEvent) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.counters.inc_submitted();
        let flush_critical = self.flush_wanted(&event.level);

        let mut pending = match self.queue.offer(event) {
            None => {
                self.after_enqueue(flush_critical);
                return true;
            }
            Some(event) => event,
        };

        let wait = Duration::from_millis(self.settings.core.backpressure_wait_ms);
        if !wait.is_zero() || !self.settings.core.drop_on_full {
            self.metrics.record_backpressure_wait();
            let deadline = Instant::now() + wait;
            loop {
                std::thread::sleep(BACKPRESSURE_POLL);
                match self.queue.offer(pending) {
                    None => {
                        self.after_enqueue(flush_critical);
                        return true;
                    }
                    Some(event) => pending = event,
                }
                if self.settings.core.drop_on_full && Instant::now() >= deadline {
                    break;
                }
                if self.stopped.load(Ordering::SeqCst) {
                    break;
                }
            }
        }

        self.record_producer_drop();
        false
    }

    /// Enqueue with the configured backpressure policy (async wait).
    async fn submit_async(&self, event: LogEvent) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.counters.inc_submitted();
        let flush_critical = self.flush_wanted(&event.level);

        let mut pending = match self.queue.offer(event) {
            None => {
                self.after_enqueue(flush_critical);
                return true;
            }
            Some(event) => event,
        };

        let wait = Duration::from_millis(self.settings.core.backpressure_wait_ms);
        if !wait.is_zero() || !self.settings.core.drop_on_full {
            self.metrics.record_backpressure_wait();
            let deadline = Instant::now() + wait;
            loop {
                tokio::time::sleep(BACKPRESSURE_POLL).await;
                match self.queue.offer(pending) {
                    None => {
                        self.after_enqueue(flush_critical);
                        return true;
                    }
                    Some(event) => pending = event,
                }
                if self.settings.core.drop_on_full && Instant::now() >= deadline {
                    break;
                }
                if self.stopped.load(Ordering::SeqCst) {
                    break;
                }
            }
        }

        self.record_producer_drop();
        false
    }

    /// Builds an envelope, applying the submit-side level gate. Gated
    /// events do not count as submitted.
    fn build_event(
        &self,
        level: &str,
        message: &str,
        extras: Option<Map<String, Value>>,
    ) -> Option<LogEvent> {
        if self.registry.priority(level) < self.min_priority {
            return None;
        }
        let bound = self.bound_context.read().clone();
        Some(self.builder.build(level, message, &bound, extras, None))
    }

    async fn do_drain(&self) -> DrainResult {
        let mut guard = self.drain_result.lock().await;
        if let Some(result) = guard.as_ref() {
            return result.clone();
        }
        self.stopped.store(true, Ordering::SeqCst);

        // Stop the adaptive controller first so no further actuation races
        // the drain.
        self.monitor.stop();
        let monitor_handle = self.monitor_handle.lock().take();
        if let Some(handle) = monitor_handle {
            let _ = handle.await;
        }

        // Workers drain the queue and flush before exiting.
        let handles = self.pool.drain_all();
        let deadline = self.settings.shutdown_timeout();
        if tokio::time::timeout(deadline, futures::future::join_all(handles))
            .await
            .is_err()
        {
            self.diagnostics.warn(
                "shutdown",
                "drain deadline exceeded",
                &[("timeout", &format!("{:?}", deadline))],
            );
        }

        let adaptive = self.monitor.snapshot();

        // Stop stages and sinks in reverse registration order; the tamper
        // enricher persists its chain state and sealed sinks emit their
        // final manifests here.
        for redactor in self.redactors.iter().rev() {
            if let Err(err) = redactor.stop().await {
                self.diagnostics.warn(
                    "shutdown",
                    "redactor stop failed",
                    &[("redactor", redactor.name()), ("error", &err.to_string())],
                );
            }
        }
        for enricher in self.enrichers.iter().rev() {
            if let Err(err) = enricher.stop().await {
                self.diagnostics.warn(
                    "shutdown",
                    "enricher stop failed",
                    &[("enricher", enricher.name()), ("error", &err.to_string())],
                );
            }
        }
        for filter in self.filters.iter().rev() {
            if let Err(err) = filter.stop().await {
                self.diagnostics.warn(
                    "shutdown",
                    "filter stop failed",
                    &[("filter", filter.name()), ("error", &err.to_string())],
                );
            }
        }
        for sink in self.sinks.iter().rev() {
            if let Err(err) = sink.stop().await {
                self.diagnostics.warn(
                    "shutdown",
                    "sink stop failed",
                    &[("sink", sink.name()), ("error", &err.to_string())],
                );
            }
        }

        self.metrics
            .add_diagnostics_dropped(self.diagnostics.dropped_count());

        let result = DrainResult {
            submitted: self.counters.submitted(),
            processed: self.counters.processed(),
            dropped: self.counters.dropped(),
            adaptive,
        };
        *guard = Some(result.clone());
        result
    }
}

#[async_trait]
impl Drainable for LoggerCore {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn drain(&self) {
        let _ = self.do_drain().await;
    }
}

static SIGNAL_HANDLER: OnceCell<()> = OnceCell::new();

/// Structured async logger with adaptive pressure control and optional
/// tamper-evident sealing.
///
/// Cheap to clone; all clones share one pipeline.
#[derive(Clone)]
pub struct Logger {
    core: Arc<LoggerCore>,
}

impl Logger {
    /// Starts a logger with the default level registry.
    ///
    /// Must be called from within a tokio runtime. Invalid configuration
    /// fails before anything starts.
    pub async fn start(
        settings: LoggerSettings,
        sinks: Vec<Arc<dyn Sink>>,
        components: PipelineComponents,
    ) -> Result<Logger, PipelineError> {
        Self::start_with_registry(settings, LevelRegistry::with_defaults(), sinks, components).await
    }

    /// Starts a logger with a custom level registry (frozen here).
    pub async fn start_with_registry(
        settings: LoggerSettings,
        mut registry: LevelRegistry,
        sinks: Vec<Arc<dyn Sink>>,
        components: PipelineComponents,
    ) -> Result<Logger, PipelineError> {
        settings.validate()?;
        if sinks.is_empty() {
            return Err(PipelineError::invalid_config(
                "at least one sink is required",
            ));
        }
        registry.freeze();

        let diagnostics = Diagnostics::stderr();
        let metrics = if settings.metrics_enabled {
            MetricsCollector::new()?
        } else {
            MetricsCollector::disabled()
        };

        let protected: HashSet<String> = settings
            .core
            .protected_levels
            .iter()
            .map(|level| level.to_uppercase())
            .collect();
        let queue = Arc::new(DualQueue::new(
            settings.core.max_queue_size,
            settings.core.protected_queue_size,
            protected.iter().cloned(),
        ));

        // The tamper enricher runs in the sealing sub-stage, after the
        // parallel enrichers have merged, so its MAC covers their
        // contributions and the stored event verifies as written.
        let enrichers = components.enrichers.clone();
        let mut sealers: Vec<Arc<dyn Enricher>> = Vec::new();
        if settings.tamper.enabled {
            let provider = build_key_provider(&settings.tamper, components.kms_client.clone())?;
            sealers.push(Arc::new(IntegrityEnricher::new(
                settings.tamper.clone(),
                settings.name.clone(),
                provider,
                diagnostics.clone(),
            )));
        }

        let ladder = Arc::new(FilterLadder::build(
            components.filters.clone(),
            &protected,
            &registry,
        ));

        let mut monitor = PressureMonitor::new(
            queue.clone(),
            settings.pressure.clone(),
            metrics.clone(),
            diagnostics.clone(),
        );
        let open_circuits = monitor.open_circuit_counter();
        let boost_listener: StateChangeListener = {
            Arc::new(move |_sink: &str, state: CircuitState| match state {
                CircuitState::Open => {
                    open_circuits.fetch_add(1, Ordering::SeqCst);
                }
                CircuitState::Closed => {
                    let _ =
                        open_circuits.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                            Some(count.saturating_sub(1))
                        });
                }
                CircuitState::HalfOpen => {}
            })
        };

        let fallback = FallbackWriter::stderr(
            settings.fallback_redaction,
            &settings.sensitive_fields,
            diagnostics.clone(),
        );
        let routing = settings.routing.enabled.then(|| {
            (
                settings.routing.rules.clone(),
                settings.routing.fallback_sinks.clone(),
                settings.routing.overlap,
            )
        });
        let writer = Arc::new(FanoutWriter::new(
            sinks.clone(),
            settings.breaker_config(),
            vec![boost_listener],
            routing,
            settings.core.sink_parallel_writes,
            fallback,
            metrics.clone(),
            diagnostics.clone(),
        )?);

        let batch_policy = settings.batch_policy()?;
        let batch_max = Arc::new(std::sync::atomic::AtomicUsize::new(batch_policy.max_size()));
        let counters = Arc::new(PipelineCounters::default());
        let flush = Arc::new(FlushSignal::new());

        let ctx = Arc::new(WorkerContext {
            queue: queue.clone(),
            ladder: ladder.clone(),
            enrichers: enrichers.clone(),
            sealers: sealers.clone(),
            redactors: components.redactors.clone(),
            processors: components.processors.clone(),
            enricher_concurrency: settings.core.enricher_concurrency,
            writer,
            serialize_in_flush: settings.core.serialize_in_flush,
            strict_envelope_mode: settings.core.strict_envelope_mode,
            batch_max: batch_max.clone(),
            batch_timeout: batch_policy.timeout(),
            flush: flush.clone(),
            counters: counters.clone(),
            metrics: metrics.clone(),
            diagnostics: diagnostics.clone(),
        });

        let factory: WorkerFactory = {
            let ctx = ctx.clone();
            Arc::new(move |flag: StopFlag| {
                let worker = Worker::new(ctx.clone(), flag);
                tokio::spawn(worker.run())
            })
        };
        let initial = settings.effective_worker_count();
        let pool = Arc::new(WorkerPool::new(
            initial,
            settings.effective_max_workers(),
            factory,
        ));
        metrics.set_worker_count(initial.count() as i64);

        // Actuator wiring: ladder swap, worker scaling, and batch resize
        // hang off the pressure-change event; shedding is managed by the
        // monitor tick itself.
        {
            let ladder = ladder.clone();
            let pool = pool.clone();
            let batch_max = batch_max.clone();
            let metrics = metrics.clone();
            let actuators = monitor.actuators();
            let queue_capacity = settings.core.max_queue_size;
            monitor.on_level_change(Box::new(move |change| {
                let level = change.to;
                if ladder.swap_to(level) {
                    actuators.record_filter_swap();
                }
                let before = pool.current_count();
                let after = pool.scale_to(pool.target_for_level(level));
                if after != before {
                    metrics.set_worker_count(after as i64);
                    actuators.record_worker_scaling(after);
                }
                let new_size = batch_policy.scaled_size(batch_factor(level), queue_capacity);
                if batch_max.swap(new_size, Ordering::SeqCst) != new_size {
                    actuators.record_batch_resize();
                }
            }));
        }
        let monitor = Arc::new(monitor);

        let min_priority = registry.priority(&settings.effective_log_level());
        let critical_priority = registry.priority("CRITICAL");
        let builder = EnvelopeBuilder::new(
            settings.name.clone(),
            ExceptionLimits {
                enabled: settings.core.exceptions_enabled,
                max_frames: settings.core.exceptions_max_frames,
                max_stack_chars: settings.core.exceptions_max_stack_chars,
            },
        );

        let core = Arc::new(LoggerCore {
            settings,
            registry,
            min_priority,
            critical_priority,
            builder,
            bound_context: RwLock::new(Map::new()),
            queue,
            counters,
            flush,
            metrics,
            diagnostics,
            monitor: monitor.clone(),
            monitor_handle: parking_lot::Mutex::new(None),
            pool,
            filters: components.filters,
            // Lifecycle list: user enrichers first, sealers last, so
            // reverse-order stop persists chain state before anything the
            // sealers depend on goes away.
            enrichers: {
                let mut all = enrichers;
                all.extend(sealers);
                all
            },
            redactors: components.redactors,
            sinks,
            stopped: AtomicBool::new(false),
            drain_result: tokio::sync::Mutex::new(None),
        });

        // Lifecycle start: fatal errors surface before any producer can
        // submit.
        for sink in &core.sinks {
            sink.start().await?;
        }
        for filter in &core.filters {
            filter.start().await?;
        }
        for enricher in &core.enrichers {
            enricher.start().await?;
        }
        for redactor in &core.redactors {
            redactor.start().await?;
        }

        core.pool.spawn_initial();
        let handle = tokio::spawn(monitor.run());
        *core.monitor_handle.lock() = Some(handle);

        if core.settings.core.atexit_drain_enabled {
            let weak: std::sync::Weak<dyn Drainable> = {
                let arc: Arc<dyn Drainable> = core.clone();
                Arc::downgrade(&arc)
            };
            DrainRegistry::global().register(weak);
        }
        if core.settings.core.signal_handler_enabled {
            let timeout =
                Duration::from_secs_f64(core.settings.core.atexit_drain_timeout_seconds.max(0.0));
            SIGNAL_HANDLER.get_or_init(|| {
                sealog_bootstrap::install_drain_handler(timeout);
            });
        }

        Ok(Logger { core })
    }

    /// Logs a message at the given level. Returns false when the event was
    /// gated or dropped.
    pub fn log(&self, level: &str, message: &str) -> bool {
        self.log_with(level, message, None)
    }

    /// Logs a message with call-site extras.
    pub fn log_with(&self, level: &str, message: &str, extras: Option<Map<String, Value>>) -> bool {
        match self.core.build_event(level, message, extras) {
            Some(event) => self.core.submit(event),
            None => false,
        }
    }

    /// Async submission sharing the same queue and backpressure policy.
    pub async fn log_async(
        &self,
        level: &str,
        message: &str,
        extras: Option<Map<String, Value>>,
    ) -> bool {
        match self.core.build_event(level, message, extras) {
            Some(event) => self.core.submit_async(event).await,
            None => false,
        }
    }

    /// Logs an ERROR-level message with serialized exception fields.
    pub fn exception<E: std::error::Error + 'static>(&self, message: &str, error: &E) -> bool {
        if self.core.registry.priority("ERROR") < self.core.min_priority {
            return false;
        }
        let bound = self.core.bound_context.read().clone();
        let backtrace = std::backtrace::Backtrace::capture();
        let backtrace = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        let event = self.core.builder.build_with_error(
            "ERROR",
            message,
            &bound,
            None,
            None,
            std::any::type_name::<E>(),
            error,
            backtrace,
        );
        self.core.submit(event)
    }

    /// Binds a persistent context field merged into every later event.
    pub fn bind(&self, key: impl Into<String>, value: Value) {
        self.core.bound_context.write().insert(key.into(), value);
    }

    /// Removes bound context fields.
    pub fn unbind(&self, keys: &[&str]) {
        let mut context = self.core.bound_context.write();
        for key in keys {
            context.remove(*key);
        }
    }

    /// Clears all bound context.
    pub fn clear_context(&self) {
        self.core.bound_context.write().clear();
    }

    /// Waits until every worker has flushed its current batch or the drain
    /// deadline expires.
    pub async fn flush(&self) {
        let workers = self.core.pool.current_count() as u64;
        if workers == 0 {
            return;
        }
        let baseline = self.core.flush.acks();
        self.core.flush.request();
        self.core
            .flush
            .wait_for_acks(baseline + workers, self.core.settings.shutdown_timeout())
            .await;
    }

    /// Stops producers, drains workers, stops stages and sinks in reverse
    /// order, and returns the final accounting. Idempotent.
    pub async fn stop_and_drain(&self) -> DrainResult {
        self.core.do_drain().await
    }

    /// Current pressure level.
    pub fn pressure_level(&self) -> PressureLevel {
        self.core.monitor.pressure_level()
    }

    /// Current worker count.
    pub fn worker_count(&self) -> usize {
        self.core.pool.current_count()
    }

    /// Metrics collector (text exposition via `export`).
    pub fn metrics(&self) -> &MetricsCollector {
        &self.core.metrics
    }

    level_methods! {
        (debug, debug_with, "DEBUG"),
        (info, info_with, "INFO"),
        (warning, warning_with, "WARNING"),
        (error, error_with, "ERROR"),
        (critical, critical_with, "CRITICAL"),
    }
}
