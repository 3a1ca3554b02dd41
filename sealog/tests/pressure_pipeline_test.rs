// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pressure escalation tests through the full logger: bursts against slow
//! sinks escalate the controller, scale the worker pool, and the drain
//! summary records the episode.

use async_trait::async_trait;
use sealog::{
    LogEvent, Logger, LoggerSettings, PipelineComponents, PipelineError, PressureLevel, Sink,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sink that is slow while `congested` is set and instant afterwards.
struct CongestibleSink {
    congested: AtomicBool,
    delay: Duration,
    written: AtomicU64,
}

impl CongestibleSink {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            congested: AtomicBool::new(true),
            delay,
            written: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Sink for CongestibleSink {
    fn name(&self) -> &str {
        "congestible"
    }

    async fn write(&self, _event: &LogEvent) -> Result<(), PipelineError> {
        if self.congested.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_escalates_and_scales_workers() {
    let sink = CongestibleSink::new(Duration::from_millis(50));

    let mut settings = LoggerSettings::named("burst");
    settings.core.max_queue_size = 100;
    settings.core.protected_queue_size = 100;
    settings.core.worker_count = Some(2);
    settings.core.max_workers = Some(4);
    settings.core.batch_max_size = 4;
    settings.core.batch_timeout_seconds = 0.005;
    settings.core.backpressure_wait_ms = 0;
    settings.core.drop_on_full = true;
    settings.core.log_level = Some("DEBUG".to_string());
    settings.core.signal_handler_enabled = false;
    settings.core.atexit_drain_enabled = false;
    settings.core.shutdown_timeout_seconds = 10.0;
    settings.pressure.check_interval_seconds = 0.01;
    settings.pressure.cooldown_seconds = 0.03;

    let logger = Logger::start(settings, vec![sink.clone()], PipelineComponents::default())
        .await
        .unwrap();
    assert_eq!(logger.worker_count(), 2);

    // Submit bursts while the sink is congested; the queue fills and the
    // controller climbs the ladder.
    for index in 0..300 {
        logger.info(&format!("burst-{}", index));
        if index % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    let reached_high = wait_until(Duration::from_secs(5), || {
        logger.pressure_level() >= PressureLevel::High
    })
    .await;
    assert!(reached_high, "pressure never reached HIGH");

    // Clear the congestion; workers drain the backlog and pressure falls
    // back toward NORMAL.
    sink.congested.store(false, Ordering::SeqCst);
    let recovered = wait_until(Duration::from_secs(10), || {
        logger.pressure_level() == PressureLevel::Normal
    })
    .await;
    assert!(recovered, "pressure never returned to NORMAL");

    let result = logger.stop_and_drain().await;

    assert!(result.adaptive.peak_pressure_level >= PressureLevel::High);
    assert!(result.adaptive.escalation_count >= 2);
    assert!(result.adaptive.deescalation_count >= 1);
    assert!(result.adaptive.workers_scaled >= 1);
    assert!(result.adaptive.peak_workers >= 3);
    assert!(result.adaptive.filters_swapped >= 1);
    assert!(result.adaptive.time_at_level.high > 0.0);
    assert_eq!(result.processed + result.dropped, result.submitted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quiet_pipeline_stays_at_normal() {
    let sink = CongestibleSink::new(Duration::from_millis(0));
    sink.congested.store(false, Ordering::SeqCst);

    let mut settings = LoggerSettings::named("quiet");
    settings.core.worker_count = Some(2);
    settings.core.batch_timeout_seconds = 0.01;
    settings.core.log_level = Some("DEBUG".to_string());
    settings.core.signal_handler_enabled = false;
    settings.core.atexit_drain_enabled = false;
    settings.pressure.check_interval_seconds = 0.01;

    let logger = Logger::start(settings, vec![sink.clone()], PipelineComponents::default())
        .await
        .unwrap();

    for index in 0..50 {
        logger.info(&format!("calm-{}", index));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(logger.pressure_level(), PressureLevel::Normal);
    assert_eq!(logger.worker_count(), 2);

    let result = logger.stop_and_drain().await;
    assert_eq!(result.adaptive.peak_pressure_level, PressureLevel::Normal);
    assert_eq!(result.adaptive.escalation_count, 0);
    assert_eq!(result.dropped, 0);
    assert_eq!(sink.written.load(Ordering::SeqCst), 50);
}
