// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end logger tests: submission ordering, context binding, drain
//! accounting, flush semantics, custom levels, and a fully sealed
//! pipeline through the logger facade.

use async_trait::async_trait;
use parking_lot::Mutex;
use sealog::{
    fields, LevelRegistry, LogEvent, Logger, LoggerSettings, PipelineComponents, PipelineError,
    Sink,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Sink capturing structured events for assertions.
struct CollectSink {
    name: String,
    events: Mutex<Vec<LogEvent>>,
}

impl CollectSink {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
        })
    }

    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }
}

#[async_trait]
impl Sink for CollectSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, event: &LogEvent) -> Result<(), PipelineError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

fn fast_settings(name: &str) -> LoggerSettings {
    let mut settings = LoggerSettings::named(name);
    settings.core.worker_count = Some(1);
    settings.core.batch_timeout_seconds = 0.01;
    settings.core.log_level = Some("DEBUG".to_string());
    settings.core.signal_handler_enabled = false;
    settings.core.atexit_drain_enabled = false;
    settings
}

#[tokio::test]
async fn test_single_worker_preserves_submission_order() {
    let sink = CollectSink::new("collect");
    let logger = Logger::start(
        fast_settings("order"),
        vec![sink.clone()],
        PipelineComponents::default(),
    )
    .await
    .unwrap();

    for index in 0..200 {
        assert!(logger.info(&format!("msg-{:03}", index)));
    }
    let result = logger.stop_and_drain().await;

    assert_eq!(result.submitted, 200);
    assert_eq!(result.processed, 200);
    assert_eq!(result.dropped, 0);

    let messages = sink.messages();
    assert_eq!(messages.len(), 200);
    let expected: Vec<String> = (0..200).map(|i| format!("msg-{:03}", i)).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn test_drain_accounting_balances() {
    let sink = CollectSink::new("collect");
    let mut settings = fast_settings("accounting");
    settings.core.max_queue_size = 8;
    settings.core.backpressure_wait_ms = 0;
    settings.core.drop_on_full = true;
    let logger = Logger::start(settings, vec![sink.clone()], PipelineComponents::default())
        .await
        .unwrap();

    for index in 0..500 {
        logger.info(&format!("m{}", index));
    }
    let result = logger.stop_and_drain().await;

    // submitted = processed + dropped once fully drained
    assert_eq!(result.submitted, 500);
    assert_eq!(result.processed + result.dropped, result.submitted);
    assert_eq!(sink.events.lock().len() as u64, result.processed);
}

#[tokio::test]
async fn test_bound_context_and_extras_precedence() {
    let sink = CollectSink::new("collect");
    let logger = Logger::start(
        fast_settings("context"),
        vec![sink.clone()],
        PipelineComponents::default(),
    )
    .await
    .unwrap();

    logger.bind("tenant", Value::String("alpha".to_string()));
    logger.bind("region", Value::String("us-east".to_string()));
    logger.info("bound-only");
    logger.info_with("extras-win", fields! {"tenant" => "beta"});
    logger.unbind(&["region"]);
    logger.info("after-unbind");
    logger.clear_context();
    logger.info("after-clear");

    logger.stop_and_drain().await;

    let events = sink.events.lock();
    assert_eq!(events[0].metadata["tenant"], "alpha");
    assert_eq!(events[0].metadata["region"], "us-east");
    // Call-site extras win on collision
    assert_eq!(events[1].metadata["tenant"], "beta");
    assert!(!events[2].metadata.contains_key("region"));
    assert_eq!(events[2].metadata["tenant"], "alpha");
    assert!(!events[3].metadata.contains_key("tenant"));
}

#[tokio::test]
async fn test_submit_side_level_gate() {
    let sink = CollectSink::new("collect");
    let mut settings = fast_settings("gate");
    settings.core.log_level = Some("WARNING".to_string());
    let logger = Logger::start(settings, vec![sink.clone()], PipelineComponents::default())
        .await
        .unwrap();

    assert!(!logger.debug("gated"));
    assert!(!logger.info("gated"));
    assert!(logger.warning("passes"));
    assert!(logger.error("passes"));
    let result = logger.stop_and_drain().await;

    // Gated events never count as submitted
    assert_eq!(result.submitted, 2);
    assert_eq!(sink.messages(), vec!["passes", "passes"]);
}

#[tokio::test]
async fn test_flush_makes_batched_events_visible() {
    let sink = CollectSink::new("collect");
    let mut settings = fast_settings("flush");
    // Long batch timeout so only flush can force emission quickly
    settings.core.batch_timeout_seconds = 30.0;
    settings.core.batch_max_size = 1000;
    let logger = Logger::start(settings, vec![sink.clone()], PipelineComponents::default())
        .await
        .unwrap();

    logger.info("one");
    logger.info("two");
    logger.flush().await;
    assert_eq!(sink.events.lock().len(), 2);

    logger.stop_and_drain().await;
}

#[tokio::test]
async fn test_custom_level_routing() {
    let sink = CollectSink::new("collect");
    let mut registry = LevelRegistry::with_defaults();
    registry.register("TRACE", 5).unwrap();
    registry.register("AUDIT", 60).unwrap();

    let mut settings = fast_settings("levels");
    settings.core.log_level = Some("TRACE".to_string());
    let logger = Logger::start_with_registry(
        settings,
        registry,
        vec![sink.clone()],
        PipelineComponents::default(),
    )
    .await
    .unwrap();

    assert!(logger.log("trace", "low level"));
    assert!(logger.log("AUDIT", "compliance"));
    logger.stop_and_drain().await;

    let events = sink.events.lock();
    assert_eq!(events[0].level, "TRACE");
    assert_eq!(events[1].level, "AUDIT");
}

#[tokio::test]
async fn test_exception_carries_error_fields() {
    let sink = CollectSink::new("collect");
    let logger = Logger::start(
        fast_settings("exception"),
        vec![sink.clone()],
        PipelineComponents::default(),
    )
    .await
    .unwrap();

    let error = std::io::Error::new(std::io::ErrorKind::NotFound, "config missing");
    assert!(logger.exception("startup failed", &error));
    logger.stop_and_drain().await;

    let events = sink.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, "ERROR");
    assert!(events[0].metadata["error.type"]
        .as_str()
        .unwrap()
        .contains("io::error::Error"));
    assert_eq!(events[0].metadata["error.message"], "config missing");
}

#[tokio::test]
async fn test_stop_and_drain_is_idempotent() {
    let sink = CollectSink::new("collect");
    let logger = Logger::start(
        fast_settings("idempotent"),
        vec![sink],
        PipelineComponents::default(),
    )
    .await
    .unwrap();

    logger.info("one");
    let first = logger.stop_and_drain().await;
    let second = logger.stop_and_drain().await;
    assert_eq!(first, second);

    // Submissions after drain are refused
    assert!(!logger.info("late"));
}

#[tokio::test]
async fn test_invalid_configuration_fails_before_start() {
    let mut settings = fast_settings("invalid");
    settings.core.max_queue_size = 0;
    let sink: Arc<dyn Sink> = CollectSink::new("collect");
    let result = Logger::start(settings, vec![sink], PipelineComponents::default()).await;
    assert!(matches!(
        result.err(),
        Some(PipelineError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_sealed_pipeline_through_logger() {
    use sealog::{KeySource, TamperAlgorithm};

    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("seal.key");
    std::fs::write(&key_path, [7u8; 32]).unwrap();

    let sink = CollectSink::new("collect");
    let mut settings = fast_settings("sealed");
    settings.tamper.enabled = true;
    settings.tamper.algorithm = TamperAlgorithm::HmacSha256;
    settings.tamper.key_id = "k1".to_string();
    settings.tamper.key_source = KeySource::File;
    settings.tamper.key_file_path = Some(key_path);
    settings.tamper.state_dir = dir.path().to_path_buf();

    let logger = Logger::start(settings, vec![sink.clone()], PipelineComponents::default())
        .await
        .unwrap();

    logger.info("first");
    logger.info("second");
    logger.info("third");
    let result = logger.stop_and_drain().await;
    assert_eq!(result.processed, 3);

    let events = sink.events.lock();
    let mut seqs = Vec::new();
    for event in events.iter() {
        let block = event.integrity().expect("sealed event");
        seqs.push(block["seq"].as_u64().unwrap());
    }
    assert_eq!(seqs, vec![1, 2, 3]);

    // Chain linkage holds across the pipeline
    for window in events.windows(2) {
        let previous = window[0].integrity().unwrap();
        let next = window[1].integrity().unwrap();
        assert_eq!(next["prev_chain_hash"], previous["chain_hash"]);
    }

    // The chain state file was persisted on drain
    assert!(dir.path().join("sealed.chainstate").exists());

    // Wait a moment so the diagnostics writer task drains
    tokio::time::sleep(Duration::from_millis(10)).await;
}
