// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Collector
//!
//! Prometheus metrics for the logging pipeline: event counters by outcome,
//! backpressure and sink error counters, flush latency and per-plugin timing
//! histograms, and gauges for queue depth, high-watermark, pressure level,
//! and worker count.
//!
//! ## Design
//!
//! - **Isolated registry**: each logger owns its own `Registry`; nothing is
//!   registered globally, so tests and multi-logger processes never collide
//! - **No-op when disabled**: a disabled collector skips every recording
//!   call; call sites need no conditional logic
//! - **Text exposition**: `export()` renders the registry in Prometheus
//!   text format for scraping or dumping on drain

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use sealog_domain::{PipelineError, PressureLevel};
use std::sync::Arc;

/// Drop-cause label values used with the dropped-events counter.
pub mod drop_cause {
    pub const QUEUE_FULL: &str = "queue_full";
    pub const FILTER: &str = "filter";
    pub const SERIALIZATION: &str = "serialization";
}

struct MetricsInner {
    registry: Registry,
    events_processed_total: IntCounter,
    events_dropped_total: IntCounterVec,
    backpressure_waits_total: IntCounter,
    sink_errors_total: IntCounterVec,
    diagnostics_dropped_total: IntCounter,
    flush_duration_seconds: Histogram,
    plugin_duration_seconds: HistogramVec,
    queue_high_watermark: IntGauge,
    pressure_level: IntGauge,
    queue_depth: IntGaugeVec,
    queue_drops: IntGaugeVec,
    worker_count: IntGauge,
}

/// Container-scoped metrics collector.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Option<Arc<MetricsInner>>,
}

impl MetricsCollector {
    /// Creates a disabled collector; every recording call is a no-op.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Creates an enabled collector with an isolated Prometheus registry.
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let events_processed_total = IntCounter::with_opts(
            Opts::new(
                "events_processed_total",
                "Total events delivered to the sink writer",
            )
            .namespace("sealog"),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create events_processed_total: {}", e))
        })?;

        let events_dropped_total = IntCounterVec::new(
            Opts::new("events_dropped_total", "Total events dropped, by cause").namespace("sealog"),
            &["cause"],
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create events_dropped_total: {}", e))
        })?;

        let backpressure_waits_total = IntCounter::with_opts(
            Opts::new(
                "backpressure_waits_total",
                "Producer waits entered because the queue was full",
            )
            .namespace("sealog"),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!(
                "Failed to create backpressure_waits_total: {}",
                e
            ))
        })?;

        let sink_errors_total = IntCounterVec::new(
            Opts::new("sink_errors_total", "Sink write failures, by sink").namespace("sealog"),
            &["sink"],
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create sink_errors_total: {}", e))
        })?;

        let diagnostics_dropped_total = IntCounter::with_opts(
            Opts::new(
                "diagnostics_dropped_total",
                "Diagnostics dropped because the bounded channel was full",
            )
            .namespace("sealog"),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!(
                "Failed to create diagnostics_dropped_total: {}",
                e
            ))
        })?;

        let flush_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("flush_duration_seconds", "Latency of one batch flush")
                .namespace("sealog")
                .buckets(vec![
                    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ]),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create flush_duration_seconds: {}", e))
        })?;

        let plugin_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "plugin_duration_seconds",
                "Per-plugin stage execution latency",
            )
            .namespace("sealog")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.1]),
            &["plugin"],
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create plugin_duration_seconds: {}", e))
        })?;

        let queue_high_watermark = IntGauge::with_opts(
            Opts::new("queue_high_watermark", "Deepest main-queue depth observed")
                .namespace("sealog"),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create queue_high_watermark: {}", e))
        })?;

        let pressure_level = IntGauge::with_opts(
            Opts::new(
                "pressure_level",
                "Current pressure level (0=normal .. 3=critical)",
            )
            .namespace("sealog"),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create pressure_level: {}", e))
        })?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("queue_depth", "Current queue depth, by queue").namespace("sealog"),
            &["queue"],
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create queue_depth: {}", e))
        })?;

        let queue_drops = IntGaugeVec::new(
            Opts::new("queue_drops_total", "Enqueue refusals, by queue").namespace("sealog"),
            &["queue"],
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create queue_drops: {}", e))
        })?;

        let worker_count = IntGauge::with_opts(
            Opts::new("worker_count", "Current worker pool size").namespace("sealog"),
        )
        .map_err(|e| {
            PipelineError::metrics_error(format!("Failed to create worker_count: {}", e))
        })?;

        // Register all metrics
        registry
            .register(Box::new(events_processed_total.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register events_processed_total: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(events_dropped_total.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register events_dropped_total: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(backpressure_waits_total.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register backpressure_waits_total: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(sink_errors_total.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!("Failed to register sink_errors_total: {}", e))
            })?;
        registry
            .register(Box::new(diagnostics_dropped_total.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register diagnostics_dropped_total: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(flush_duration_seconds.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register flush_duration_seconds: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(plugin_duration_seconds.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register plugin_duration_seconds: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(queue_high_watermark.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!(
                    "Failed to register queue_high_watermark: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(pressure_level.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!("Failed to register pressure_level: {}", e))
            })?;
        registry
            .register(Box::new(queue_depth.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!("Failed to register queue_depth: {}", e))
            })?;
        registry
            .register(Box::new(queue_drops.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!("Failed to register queue_drops: {}", e))
            })?;
        registry
            .register(Box::new(worker_count.clone()))
            .map_err(|e| {
                PipelineError::metrics_error(format!("Failed to register worker_count: {}", e))
            })?;

        tracing::debug!("MetricsCollector initialized with isolated registry");

        Ok(Self {
            inner: Some(Arc::new(MetricsInner {
                registry,
                events_processed_total,
                events_dropped_total,
                backpressure_waits_total,
                sink_errors_total,
                diagnostics_dropped_total,
                flush_duration_seconds,
                plugin_duration_seconds,
                queue_high_watermark,
                pressure_level,
                queue_depth,
                queue_drops,
                worker_count,
            })),
        })
    }

    /// True when recording calls actually reach the registry.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Increments the processed-events counter.
    pub fn record_event_processed(&self) {
        if let Some(inner) = &self.inner {
            inner.events_processed_total.inc();
        }
    }

    /// Increments the dropped-events counter for the given cause.
    pub fn record_event_dropped(&self, cause: &str) {
        if let Some(inner) = &self.inner {
            inner.events_dropped_total.with_label_values(&[cause]).inc();
        }
    }

    /// Increments the backpressure-wait counter.
    pub fn record_backpressure_wait(&self) {
        if let Some(inner) = &self.inner {
            inner.backpressure_waits_total.inc();
        }
    }

    /// Increments the sink-error counter for the named sink.
    pub fn record_sink_error(&self, sink: &str) {
        if let Some(inner) = &self.inner {
            inner.sink_errors_total.with_label_values(&[sink]).inc();
        }
    }

    /// Adds to the diagnostics-dropped counter.
    pub fn add_diagnostics_dropped(&self, count: u64) {
        if let Some(inner) = &self.inner {
            inner.diagnostics_dropped_total.inc_by(count);
        }
    }

    /// Records one batch flush.
    pub fn record_flush(&self, latency_seconds: f64) {
        if let Some(inner) = &self.inner {
            inner.flush_duration_seconds.observe(latency_seconds);
        }
    }

    /// Records one plugin stage execution.
    pub fn record_plugin_duration(&self, plugin: &str, seconds: f64) {
        if let Some(inner) = &self.inner {
            inner
                .plugin_duration_seconds
                .with_label_values(&[plugin])
                .observe(seconds);
        }
    }

    /// Raises the queue high-watermark gauge if `depth` exceeds it.
    pub fn set_queue_high_watermark(&self, depth: i64) {
        if let Some(inner) = &self.inner {
            if depth > inner.queue_high_watermark.get() {
                inner.queue_high_watermark.set(depth);
            }
        }
    }

    /// Sets the pressure level gauge.
    pub fn set_pressure_level(&self, level: PressureLevel) {
        if let Some(inner) = &self.inner {
            inner.pressure_level.set(level.index() as i64);
        }
    }

    /// Sets a queue depth gauge.
    pub fn set_queue_depth(&self, queue: &str, depth: i64) {
        if let Some(inner) = &self.inner {
            inner.queue_depth.with_label_values(&[queue]).set(depth);
        }
    }

    /// Sets a queue drop gauge from the queue's refusal counter.
    pub fn set_queue_drops(&self, queue: &str, drops: i64) {
        if let Some(inner) = &self.inner {
            inner.queue_drops.with_label_values(&[queue]).set(drops);
        }
    }

    /// Sets the worker count gauge.
    pub fn set_worker_count(&self, count: i64) {
        if let Some(inner) = &self.inner {
            inner.worker_count.set(count);
        }
    }

    /// Renders the registry in Prometheus text format.
    pub fn export(&self) -> Result<String, PipelineError> {
        match &self.inner {
            Some(inner) => {
                let encoder = TextEncoder::new();
                encoder
                    .encode_to_string(&inner.registry.gather())
                    .map_err(|e| {
                        PipelineError::metrics_error(format!("Failed to encode metrics: {}", e))
                    })
            }
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests metrics collector creation and exposition output.
    ///
    /// Verifies the collector initializes its isolated registry and renders
    /// non-empty Prometheus text once a counter has been touched.
    #[test]
    fn test_enabled_collector_exports_text() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_event_processed();
        metrics.record_event_dropped(drop_cause::QUEUE_FULL);
        metrics.record_sink_error("stdout");
        metrics.record_flush(0.002);
        metrics.set_pressure_level(PressureLevel::High);

        let text = metrics.export().unwrap();
        assert!(text.contains("sealog_events_processed_total"));
        assert!(text.contains("sealog_events_dropped_total"));
        assert!(text.contains("sealog_pressure_level 2"));
    }

    #[test]
    fn test_disabled_collector_is_noop() {
        let metrics = MetricsCollector::disabled();
        assert!(!metrics.is_enabled());
        metrics.record_event_processed();
        metrics.set_queue_depth("main", 5);
        assert_eq!(metrics.export().unwrap(), "");
    }

    #[test]
    fn test_high_watermark_only_rises() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.set_queue_high_watermark(10);
        metrics.set_queue_high_watermark(5);
        let text = metrics.export().unwrap();
        assert!(text.contains("sealog_queue_high_watermark 10"));
    }

    #[test]
    fn test_isolated_registries_do_not_collide() {
        let first = MetricsCollector::new().unwrap();
        let second = MetricsCollector::new().unwrap();
        first.record_event_processed();
        let text = second.export().unwrap();
        assert!(text.contains("sealog_events_processed_total 0"));
    }
}
