// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Worker
//!
//! Background task that drains event batches from the dual queue and runs
//! the ordered stage pipeline:
//!
//! 1. **Filters** (active ladder tuple, sequential)
//! 2. **Enrichers** (parallel with bounded concurrency, ordered merge;
//!    sealing enrichers run sequentially afterwards over the merged event)
//! 3. **Redactors** (strictly sequential, last-good snapshot on failure)
//! 4. **Serialize** (optional, canonical envelope bytes)
//! 5. **Processors** (byte-level, sequential, input bytes kept on failure)
//! 6. **Sink write** (serialized path preferred when available)
//!
//! ## Batch Protocol
//!
//! The first dequeued event starts a batch with deadline `now +
//! batch_timeout`; the batch flushes when full (the adaptive batch size),
//! at the deadline, on an explicit flush signal, or on stop. On stop the
//! worker drains the queue completely and flushes before exiting.
//!
//! ## Containment
//!
//! Every stage failure is contained: the event continues with the last
//! good snapshot and a rate-limited diagnostic is emitted. Within one sink,
//! events written by one worker preserve their dequeue order.

use crate::infrastructure::diagnostics::Diagnostics;
use crate::infrastructure::metrics::{drop_cause, MetricsCollector};
use crate::infrastructure::runtime::filter_ladder::FilterLadder;
use crate::infrastructure::runtime::queue::DualQueue;
use crate::infrastructure::runtime::worker_pool::StopFlag;
use crate::infrastructure::serialization::{serialize_envelope, serialize_lossy};
use crate::infrastructure::sinks::fanout::FanoutWriter;
use futures::stream::{self, StreamExt};
use sealog_domain::entities::log_event::RESERVED_KEYS;
use sealog_domain::services::stage::{Enricher, Processor, Redactor};
use sealog_domain::{LogEvent, SerializedView};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Idle poll interval when the queue is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Explicit flush coordination between the facade and the workers.
///
/// The facade bumps the generation; each worker flushes once per observed
/// generation and acknowledges. The facade waits until every worker has
/// acknowledged (or a timeout expires).
pub struct FlushSignal {
    generation: AtomicU64,
    acks: AtomicU64,
    notify: Notify,
}

impl FlushSignal {
    /// Creates a flush signal.
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Requests a flush; returns the new generation.
    pub fn request(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Total acknowledgements recorded so far.
    pub fn acks(&self) -> u64 {
        self.acks.load(Ordering::SeqCst)
    }

    /// Acknowledges one observed flush generation.
    pub fn acknowledge(&self) {
        self.acks.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Waits until total acknowledgements reach `target` or the timeout
    /// expires. Returns true on success.
    pub async fn wait_for_acks(&self, target: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.acks() < target {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return self.acks() >= target,
            };
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the re-check so an ack between the check and
            // the await cannot be missed
            notified.as_mut().enable();
            if self.acks() >= target {
                return true;
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return self.acks() >= target;
            }
        }
        true
    }
}

impl Default for FlushSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared event accounting: `submitted = processed + dropped + in-flight`.
#[derive(Default)]
pub struct PipelineCounters {
    submitted: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl PipelineCounters {
    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs to run the pipeline; shared by all workers of
/// one logger.
pub struct WorkerContext {
    pub queue: Arc<DualQueue>,
    pub ladder: Arc<FilterLadder>,
    pub enrichers: Vec<Arc<dyn Enricher>>,
    /// Sealing enrichers run sequentially after the parallel merge so
    /// their MAC covers every other enricher's contribution.
    pub sealers: Vec<Arc<dyn Enricher>>,
    pub redactors: Vec<Arc<dyn Redactor>>,
    pub processors: Vec<Arc<dyn Processor>>,
    pub enricher_concurrency: usize,
    pub writer: Arc<FanoutWriter>,
    pub serialize_in_flush: bool,
    pub strict_envelope_mode: bool,
    /// Adaptive batch size, resized by the pressure controller.
    pub batch_max: Arc<AtomicUsize>,
    pub batch_timeout: Duration,
    pub flush: Arc<FlushSignal>,
    pub counters: Arc<PipelineCounters>,
    pub metrics: MetricsCollector,
    pub diagnostics: Diagnostics,
}

/// One worker task.
pub struct Worker {
    ctx: Arc<WorkerContext>,
    stop: StopFlag,
}

impl Worker {
    /// Creates a worker bound to its stop flag.
    pub fn new(ctx: Arc<WorkerContext>, stop: StopFlag) -> Self {
        Self { ctx, stop }
    }

    /// Worker loop: batch, flush, repeat until the stop flag is set.
    pub async fn run(self) {
        let mut batch: Vec<LogEvent> = Vec::new();
        let mut deadline: Option<Instant> = None;
        let mut flush_seen = self.ctx.flush.generation();

        loop {
            if self.stop.is_set() {
                self.ctx.queue.drain_into(&mut batch);
                self.flush_batch(&mut batch).await;
                return;
            }

            let flush_generation = self.ctx.flush.generation();
            if flush_generation != flush_seen {
                self.ctx.queue.drain_into(&mut batch);
                if !batch.is_empty() {
                    self.flush_batch(&mut batch).await;
                    deadline = None;
                }
                flush_seen = flush_generation;
                self.ctx.flush.acknowledge();
                continue;
            }

            if let Some(event) = self.ctx.queue.try_dequeue() {
                batch.push(event);
                if batch.len() >= self.ctx.batch_max.load(Ordering::Relaxed) {
                    self.flush_batch(&mut batch).await;
                    deadline = None;
                    continue;
                }
                if deadline.is_none() {
                    deadline = Some(Instant::now() + self.ctx.batch_timeout);
                }
                continue;
            }

            if let Some(at) = deadline {
                if Instant::now() >= at {
                    self.flush_batch(&mut batch).await;
                    deadline = None;
                    continue;
                }
            }

            tokio::time::sleep(IDLE_SLEEP).await;
        }
    }

    /// Runs the pipeline over every event in the batch, in dequeue order.
    async fn flush_batch(&self, batch: &mut Vec<LogEvent>) {
        if batch.is_empty() {
            return;
        }
        let started = Instant::now();
        for event in batch.drain(..) {
            self.process_event(event).await;
        }
        self.ctx
            .metrics
            .record_flush(started.elapsed().as_secs_f64());
    }

    /// Runs one event through filters, enrichers, redactors, processors,
    /// and the sink writer.
    async fn process_event(&self, event: LogEvent) {
        let ctx = &self.ctx;

        // 1. Filters (active ladder tuple), sequential
        let mut current = event;
        for filter in ctx.ladder.active().iter() {
            let started = Instant::now();
            match filter.filter(current.clone()).await {
                Ok(Some(next)) => {
                    ctx.metrics
                        .record_plugin_duration(filter.name(), started.elapsed().as_secs_f64());
                    current = next;
                }
                Ok(None) => {
                    ctx.metrics
                        .record_plugin_duration(filter.name(), started.elapsed().as_secs_f64());
                    ctx.metrics.record_event_dropped(drop_cause::FILTER);
                    ctx.counters.inc_dropped();
                    return;
                }
                Err(err) => {
                    // A failing filter is skipped; the event continues
                    ctx.diagnostics.warn(
                        "filter",
                        "filter error",
                        &[("filter", filter.name()), ("reason", &err.to_string())],
                    );
                }
            }
        }

        // 2. Enrichers, parallel with bounded concurrency, ordered merge
        if !ctx.enrichers.is_empty() {
            let snapshot = &current;
            let enrich_futures: Vec<_> = ctx
                .enrichers
                .iter()
                .cloned()
                .map(|enricher| async move {
                    let started = Instant::now();
                    let result = enricher.enrich(snapshot).await;
                    (enricher, started.elapsed(), result)
                })
                .collect();
            let contributions: Vec<_> = stream::iter(enrich_futures)
                .buffered(ctx.enricher_concurrency.max(1))
                .collect()
                .await;

            let mut merged = current.clone();
            for (enricher, elapsed, result) in contributions {
                ctx.metrics
                    .record_plugin_duration(enricher.name(), elapsed.as_secs_f64());
                match result {
                    Ok(fields) => {
                        for (key, value) in fields {
                            if RESERVED_KEYS.contains(&key.as_str()) {
                                continue;
                            }
                            merged.metadata.insert(key, value);
                        }
                    }
                    Err(err) => {
                        // A failed enricher contributes nothing
                        ctx.diagnostics.warn(
                            "enricher",
                            "enrichment error",
                            &[("enricher", enricher.name()), ("reason", &err.to_string())],
                        );
                    }
                }
            }
            current = merged;
        }

        // 2b. Sealing enrichers, sequential over the merged event so the
        // seal covers every contribution above
        for sealer in &ctx.sealers {
            let started = Instant::now();
            match sealer.enrich(&current).await {
                Ok(fields) => {
                    ctx.metrics
                        .record_plugin_duration(sealer.name(), started.elapsed().as_secs_f64());
                    for (key, value) in fields {
                        if RESERVED_KEYS.contains(&key.as_str()) {
                            continue;
                        }
                        current.metadata.insert(key, value);
                    }
                }
                Err(err) => {
                    ctx.diagnostics.warn(
                        "enricher",
                        "enrichment error",
                        &[("enricher", sealer.name()), ("reason", &err.to_string())],
                    );
                }
            }
        }

        // 3. Redactors, strictly sequential, last-good snapshot on failure
        for redactor in &ctx.redactors {
            let started = Instant::now();
            match redactor.redact(current.clone()).await {
                Ok(next) => {
                    ctx.metrics
                        .record_plugin_duration(redactor.name(), started.elapsed().as_secs_f64());
                    current = next;
                }
                Err(err) => {
                    ctx.diagnostics.warn(
                        "redactor",
                        "redaction error",
                        &[("redactor", redactor.name()), ("reason", &err.to_string())],
                    );
                }
            }
        }

        // 4./5. Optional serialize + byte-level processors
        let serialized = if ctx.serialize_in_flush && ctx.writer.supports_serialized() {
            match self.try_serialize(&current) {
                Some(view) => Some(self.apply_processors(view).await),
                None => return, // strict mode dropped the event
            }
        } else {
            None
        };

        // 6. Sink write
        ctx.writer.write(&current, serialized.as_ref()).await;
        ctx.counters.inc_processed();
        ctx.metrics.record_event_processed();
    }

    /// Serializes the envelope under the strict/best-effort policy.
    ///
    /// Returns `None` when strict mode drops the event (already counted).
    fn try_serialize(&self, event: &LogEvent) -> Option<SerializedView> {
        match serialize_envelope(event) {
            Ok(view) => Some(view),
            Err(err) => {
                let strict = self.ctx.strict_envelope_mode;
                self.ctx.diagnostics.warn(
                    "sink",
                    "envelope serialization error",
                    &[
                        ("mode", if strict { "strict" } else { "best-effort" }),
                        ("detail", &err.to_string()),
                    ],
                );
                if strict {
                    self.ctx
                        .metrics
                        .record_event_dropped(drop_cause::SERIALIZATION);
                    self.ctx.counters.inc_dropped();
                    None
                } else {
                    Some(serialize_lossy(event))
                }
            }
        }
    }

    /// Runs byte-level processors sequentially; a failing processor falls
    /// back to its input bytes.
    async fn apply_processors(&self, view: SerializedView) -> SerializedView {
        if self.ctx.processors.is_empty() {
            return view;
        }
        let mut current = view.into_bytes();
        for processor in &self.ctx.processors {
            let started = Instant::now();
            match processor.process(&current).await {
                Ok(next) => {
                    self.ctx
                        .metrics
                        .record_plugin_duration(processor.name(), started.elapsed().as_secs_f64());
                    current = next;
                }
                Err(err) => {
                    self.ctx.diagnostics.warn(
                        "processor",
                        "processor error",
                        &[("processor", processor.name()), ("error", &err.to_string())],
                    );
                }
            }
        }
        SerializedView::new(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flush_signal_ack_round_trip() {
        let signal = Arc::new(FlushSignal::new());
        let baseline = signal.acks();
        let generation = signal.request();
        assert_eq!(generation, 1);

        let worker_signal = signal.clone();
        tokio::spawn(async move {
            worker_signal.acknowledge();
        });

        assert!(
            signal
                .wait_for_acks(baseline + 1, Duration::from_secs(1))
                .await
        );
    }

    #[tokio::test]
    async fn test_flush_signal_timeout() {
        let signal = FlushSignal::new();
        signal.request();
        assert!(!signal.wait_for_acks(1, Duration::from_millis(20)).await);
    }

    #[test]
    fn test_counters_accounting() {
        let counters = PipelineCounters::default();
        counters.inc_submitted();
        counters.inc_submitted();
        counters.inc_processed();
        counters.inc_dropped();
        assert_eq!(counters.submitted(), 2);
        assert_eq!(counters.processed(), 1);
        assert_eq!(counters.dropped(), 1);
    }
}
