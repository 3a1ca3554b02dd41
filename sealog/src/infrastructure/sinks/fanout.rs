// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fan-Out / Routing Writer
//!
//! Delivers finalized events to the configured sinks, each guarded by its
//! circuit breaker.
//!
//! ## Modes
//!
//! - **Fan-out**: every sink receives every event
//! - **Routing**: an event is delivered to the sinks of every rule whose
//!   level set contains its level (`overlap = true`) or of the first
//!   matching rule (`overlap = false`); events matching no rule go to the
//!   fallback sinks
//!
//! Writes are sequential or parallel per configuration. Sink exceptions are
//! contained and recorded against the sink's breaker; they never propagate
//! to the pipeline. When an event had at least one intended target and no
//! sink accepted it, the stderr fallback writer fires with the configured
//! redaction mode.
//!
//! Serialized-write capability is resolved per sink at construction; the
//! hot path never probes.

use crate::infrastructure::diagnostics::Diagnostics;
use crate::infrastructure::metrics::MetricsCollector;
use crate::infrastructure::sinks::circuit_breaker::{
    CircuitBreakerConfig, SinkCircuitBreaker, StateChangeListener,
};
use crate::infrastructure::sinks::fallback::FallbackWriter;
use sealog_domain::services::sink::Sink;
use sealog_domain::{CircuitState, LogEvent, PipelineError, SerializedView};
use std::collections::HashSet;
use std::sync::Arc;

/// One routing rule: events at these levels go to these sinks (by name).
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub levels: Vec<String>,
    pub sinks: Vec<String>,
}

/// Routing table compiled against the actual sink list.
#[derive(Debug, Clone)]
struct CompiledRule {
    levels: HashSet<String>,
    sinks: Vec<usize>,
}

struct Routing {
    rules: Vec<CompiledRule>,
    fallback: Vec<usize>,
    overlap: bool,
}

struct SinkHandle {
    sink: Arc<dyn Sink>,
    breaker: Option<SinkCircuitBreaker>,
    serialized: bool,
    name: String,
}

/// Writer that fans events out to sinks with per-sink fault isolation.
pub struct FanoutWriter {
    handles: Vec<SinkHandle>,
    routing: Option<Routing>,
    parallel: bool,
    fallback: FallbackWriter,
    metrics: MetricsCollector,
    diagnostics: Diagnostics,
}

impl FanoutWriter {
    /// Builds a writer over the given sinks.
    ///
    /// `breaker_config = None` disables circuit breaking. Routing rules
    /// reference sinks by name; rules naming unknown sinks fail
    /// construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sinks: Vec<Arc<dyn Sink>>,
        breaker_config: Option<CircuitBreakerConfig>,
        breaker_listeners: Vec<StateChangeListener>,
        routing: Option<(Vec<RoutingRule>, Vec<String>, bool)>,
        parallel: bool,
        fallback: FallbackWriter,
        metrics: MetricsCollector,
        diagnostics: Diagnostics,
    ) -> Result<Self, PipelineError> {
        let handles: Vec<SinkHandle> = sinks
            .into_iter()
            .map(|sink| {
                let name = sink.name().to_string();
                let breaker = breaker_config.as_ref().map(|config| {
                    SinkCircuitBreaker::new(name.clone(), config.clone(), breaker_listeners.clone())
                });
                SinkHandle {
                    serialized: sink.capabilities().serialized_writes,
                    breaker,
                    name,
                    sink,
                }
            })
            .collect();

        let routing = match routing {
            None => None,
            Some((rules, fallback_sinks, overlap)) => {
                let resolve = |name: &str| -> Result<usize, PipelineError> {
                    handles
                        .iter()
                        .position(|handle| handle.name == name)
                        .ok_or_else(|| {
                            PipelineError::invalid_config(format!(
                                "routing references unknown sink '{}'",
                                name
                            ))
                        })
                };
                let compiled = rules
                    .iter()
                    .map(|rule| {
                        Ok(CompiledRule {
                            levels: rule.levels.iter().map(|l| l.to_uppercase()).collect(),
                            sinks: rule
                                .sinks
                                .iter()
                                .map(|name| resolve(name))
                                .collect::<Result<Vec<_>, _>>()?,
                        })
                    })
                    .collect::<Result<Vec<_>, PipelineError>>()?;
                let fallback_indices = fallback_sinks
                    .iter()
                    .map(|name| resolve(name))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(Routing {
                    rules: compiled,
                    fallback: fallback_indices,
                    overlap,
                })
            }
        };

        Ok(Self {
            handles,
            routing,
            parallel,
            fallback,
            metrics,
            diagnostics,
        })
    }

    /// True when at least one sink accepts pre-serialized writes; the
    /// worker only serializes in-flush when this holds.
    pub fn supports_serialized(&self) -> bool {
        self.handles.iter().any(|handle| handle.serialized)
    }

    /// Current breaker state for the named sink (breakers enabled only).
    pub fn circuit_state(&self, sink: &str) -> Option<CircuitState> {
        self.handles
            .iter()
            .find(|handle| handle.name == sink)
            .and_then(|handle| handle.breaker.as_ref())
            .map(|breaker| breaker.state())
    }

    /// Target sink indices for an event's level.
    fn targets_for(&self, level: &str) -> Vec<usize> {
        match &self.routing {
            None => (0..self.handles.len()).collect(),
            Some(routing) => {
                let level = level.to_uppercase();
                let mut seen = HashSet::new();
                let mut targets = Vec::new();
                let mut matched = false;
                for rule in &routing.rules {
                    if rule.levels.contains(&level) {
                        matched = true;
                        for &index in &rule.sinks {
                            if seen.insert(index) {
                                targets.push(index);
                            }
                        }
                        if !routing.overlap {
                            break;
                        }
                    }
                }
                if !matched {
                    for &index in &routing.fallback {
                        if seen.insert(index) {
                            targets.push(index);
                        }
                    }
                }
                targets
            }
        }
    }

    async fn write_one(
        &self,
        index: usize,
        event: &LogEvent,
        serialized: Option<&SerializedView>,
    ) -> bool {
        let handle = &self.handles[index];

        if let Some(breaker) = &handle.breaker {
            if !breaker.should_allow() {
                return false;
            }
        }

        let result = match serialized {
            Some(view) if handle.serialized => handle.sink.write_serialized(view).await,
            _ => handle.sink.write(event).await,
        };

        match result {
            Ok(()) => {
                if let Some(breaker) = &handle.breaker {
                    breaker.record_success();
                }
                true
            }
            Err(err) => {
                if let Some(breaker) = &handle.breaker {
                    breaker.record_failure();
                }
                self.metrics.record_sink_error(&handle.name);
                self.diagnostics.warn(
                    "sink",
                    "sink write failed",
                    &[("sink", &handle.name), ("error", &err.to_string())],
                );
                false
            }
        }
    }

    /// Delivers one event to its target sinks.
    ///
    /// Returns the number of sinks that accepted the event. Fires the
    /// stderr fallback when targets existed and none accepted.
    pub async fn write(&self, event: &LogEvent, serialized: Option<&SerializedView>) -> usize {
        let targets = self.targets_for(&event.level);
        if targets.is_empty() {
            return 0;
        }

        let delivered = if self.parallel && targets.len() > 1 {
            let writes = targets
                .iter()
                .map(|&index| self.write_one(index, event, serialized));
            futures::future::join_all(writes)
                .await
                .into_iter()
                .filter(|ok| *ok)
                .count()
        } else {
            let mut delivered = 0;
            for &index in &targets {
                if self.write_one(index, event, serialized).await {
                    delivered += 1;
                }
            }
            delivered
        };

        if delivered == 0 {
            self.fallback.emit(event);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sinks::fallback::{FallbackOutput, RedactMode};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Map;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CollectSink {
        name: String,
        written: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl CollectSink {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                written: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Sink for CollectSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&self, event: &LogEvent) -> Result<(), PipelineError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PipelineError::sink_error("induced failure"));
            }
            self.written.lock().push(event.message.clone());
            Ok(())
        }
    }

    struct CountOutput {
        count: AtomicUsize,
    }

    impl FallbackOutput for CountOutput {
        fn write_line(&self, _line: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(level: &str, message: &str) -> LogEvent {
        LogEvent {
            timestamp: 1.0,
            level: level.to_string(),
            message: message.to_string(),
            logger: "root".to_string(),
            correlation_id: "c".to_string(),
            metadata: Map::new(),
        }
    }

    fn writer_over(
        sinks: Vec<Arc<dyn Sink>>,
        routing: Option<(Vec<RoutingRule>, Vec<String>, bool)>,
        fallback_output: Arc<dyn FallbackOutput>,
    ) -> FanoutWriter {
        FanoutWriter::new(
            sinks,
            Some(CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: std::time::Duration::from_secs(30),
            }),
            Vec::new(),
            routing,
            false,
            FallbackWriter::new(
                fallback_output,
                RedactMode::Minimal,
                &[],
                Diagnostics::disabled(),
            ),
            MetricsCollector::disabled(),
            Diagnostics::disabled(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_all_sinks() {
        let a = CollectSink::new("a");
        let b = CollectSink::new("b");
        let writer = writer_over(
            vec![a.clone(), b.clone()],
            None,
            Arc::new(CountOutput {
                count: AtomicUsize::new(0),
            }),
        );
        let delivered = writer.write(&event("INFO", "m1"), None).await;
        assert_eq!(delivered, 2);
        assert_eq!(a.written.lock().len(), 1);
        assert_eq!(b.written.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_routing_first_match_without_overlap() {
        let errors = CollectSink::new("errors");
        let all = CollectSink::new("all");
        let rules = vec![
            RoutingRule {
                levels: vec!["ERROR".to_string(), "CRITICAL".to_string()],
                sinks: vec!["errors".to_string()],
            },
            RoutingRule {
                levels: vec!["ERROR".to_string(), "INFO".to_string()],
                sinks: vec!["all".to_string()],
            },
        ];
        let writer = writer_over(
            vec![errors.clone(), all.clone()],
            Some((rules, vec!["all".to_string()], false)),
            Arc::new(CountOutput {
                count: AtomicUsize::new(0),
            }),
        );

        writer.write(&event("ERROR", "e1"), None).await;
        assert_eq!(errors.written.lock().len(), 1);
        assert_eq!(all.written.lock().len(), 0); // first match wins

        writer.write(&event("DEBUG", "d1"), None).await;
        assert_eq!(all.written.lock().len(), 1); // fallback sinks
    }

    #[tokio::test]
    async fn test_routing_overlap_delivers_to_all_matches() {
        let errors = CollectSink::new("errors");
        let all = CollectSink::new("all");
        let rules = vec![
            RoutingRule {
                levels: vec!["ERROR".to_string()],
                sinks: vec!["errors".to_string()],
            },
            RoutingRule {
                levels: vec!["ERROR".to_string()],
                sinks: vec!["all".to_string(), "errors".to_string()],
            },
        ];
        let writer = writer_over(
            vec![errors.clone(), all.clone()],
            Some((rules, Vec::new(), true)),
            Arc::new(CountOutput {
                count: AtomicUsize::new(0),
            }),
        );

        let delivered = writer.write(&event("ERROR", "e1"), None).await;
        // errors deduplicated across rules
        assert_eq!(delivered, 2);
        assert_eq!(errors.written.lock().len(), 1);
        assert_eq!(all.written.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_fires_fallback_once() {
        let a = CollectSink::new("a");
        a.fail.store(true, Ordering::SeqCst);
        let count = Arc::new(CountOutput {
            count: AtomicUsize::new(0),
        });
        let writer = writer_over(vec![a.clone()], None, count.clone());

        let delivered = writer.write(&event("INFO", "m"), None).await;
        assert_eq!(delivered, 0);
        assert_eq!(count.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_and_skips() {
        let a = CollectSink::new("a");
        a.fail.store(true, Ordering::SeqCst);
        let writer = writer_over(
            vec![a.clone()],
            None,
            Arc::new(CountOutput {
                count: AtomicUsize::new(0),
            }),
        );

        writer.write(&event("INFO", "1"), None).await;
        writer.write(&event("INFO", "2"), None).await;
        assert_eq!(writer.circuit_state("a"), Some(CircuitState::Open));

        // Sink recovers but circuit is open: write skipped, not attempted
        a.fail.store(false, Ordering::SeqCst);
        writer.write(&event("INFO", "3"), None).await;
        assert!(a.written.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_routing_sink_fails_construction() {
        let a: Arc<dyn Sink> = CollectSink::new("a");
        let result = FanoutWriter::new(
            vec![a],
            None,
            Vec::new(),
            Some((
                vec![RoutingRule {
                    levels: vec!["INFO".to_string()],
                    sinks: vec!["missing".to_string()],
                }],
                Vec::new(),
                false,
            )),
            false,
            FallbackWriter::new(
                Arc::new(CountOutput {
                    count: AtomicUsize::new(0),
                }),
                RedactMode::Minimal,
                &[],
                Diagnostics::disabled(),
            ),
            MetricsCollector::disabled(),
            Diagnostics::disabled(),
        );
        assert!(result.is_err());
    }
}
