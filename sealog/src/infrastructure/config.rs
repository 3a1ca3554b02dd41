// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logger Configuration
//!
//! The recognized configuration surface, grouped as core / tamper / routing
//! / pressure. All settings are validated synchronously at logger
//! construction; an invalid configuration fails before anything starts.
//! Configuration is immutable once the logger is running - there is no hot
//! reload, so protected levels, queue capacities, and the sealing algorithm
//! can never change underneath a live pipeline.
//!
//! File-format loading (TOML/YAML/env layering) is an external concern;
//! this module only defines the validated value types.

use crate::infrastructure::sinks::circuit_breaker::CircuitBreakerConfig;
use crate::infrastructure::sinks::fallback::RedactMode;
use crate::infrastructure::sinks::fanout::RoutingRule;
use sealog_domain::{BatchPolicy, PipelineError, WorkerCount};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables that indicate a CI environment.
const CI_ENV_VARS: [&str; 7] = [
    "CI",
    "GITHUB_ACTIONS",
    "JENKINS_URL",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "TEAMCITY_VERSION",
];

/// Sealing algorithm for the tamper subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TamperAlgorithm {
    #[default]
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

impl TamperAlgorithm {
    /// Wire name used inside integrity blocks and manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            TamperAlgorithm::HmacSha256 => "HMAC-SHA256",
            TamperAlgorithm::Ed25519 => "Ed25519",
        }
    }
}

/// Where key material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeySource {
    #[default]
    Env,
    File,
    AwsKms,
    GcpKms,
    AzureKeyvault,
    Vault,
}

impl KeySource {
    /// True for KMS-style remote sources.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            KeySource::AwsKms | KeySource::GcpKms | KeySource::AzureKeyvault | KeySource::Vault
        )
    }
}

/// Tamper-evidence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TamperSettings {
    pub enabled: bool,
    pub algorithm: TamperAlgorithm,
    pub key_id: String,
    pub key_source: KeySource,
    pub key_env_var: String,
    pub key_file_path: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub fsync_on_write: bool,
    pub fsync_on_rotate: bool,
    pub compress_rotated: bool,
    pub rotate_chain: bool,
    pub verify_on_close: bool,
    pub alert_on_failure: bool,
    pub key_cache_ttl_seconds: u64,
}

impl Default for TamperSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: TamperAlgorithm::default(),
            key_id: String::new(),
            key_source: KeySource::default(),
            key_env_var: "SEALOG_TAMPER_KEY".to_string(),
            key_file_path: None,
            state_dir: PathBuf::from(".sealog-chainstate"),
            fsync_on_write: false,
            fsync_on_rotate: true,
            compress_rotated: false,
            rotate_chain: false,
            verify_on_close: false,
            alert_on_failure: true,
            key_cache_ttl_seconds: 300,
        }
    }
}

/// Sink routing settings.
#[derive(Debug, Clone, Default)]
pub struct RoutingSettings {
    pub enabled: bool,
    pub rules: Vec<RoutingRule>,
    pub fallback_sinks: Vec<String>,
    pub overlap: bool,
}

/// Adaptive pressure controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSettings {
    pub check_interval_seconds: f64,
    pub cooldown_seconds: f64,
    pub escalate_to_elevated: f64,
    pub escalate_to_high: f64,
    pub escalate_to_critical: f64,
    pub deescalate_from_critical: f64,
    pub deescalate_from_high: f64,
    pub deescalate_from_elevated: f64,
    pub circuit_pressure_boost: f64,
}

impl Default for PressureSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: 0.25,
            cooldown_seconds: 2.0,
            escalate_to_elevated: 0.60,
            escalate_to_high: 0.80,
            escalate_to_critical: 0.92,
            deescalate_from_critical: 0.75,
            deescalate_from_high: 0.60,
            deescalate_from_elevated: 0.40,
            circuit_pressure_boost: 0.20,
        }
    }
}

/// Core pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Submit-side level gate; `None` selects DEBUG on a TTY and INFO
    /// under CI or redirection.
    pub log_level: Option<String>,
    pub max_queue_size: usize,
    pub protected_queue_size: usize,
    pub batch_max_size: usize,
    pub batch_timeout_seconds: f64,
    pub backpressure_wait_ms: u64,
    pub drop_on_full: bool,
    /// Initial workers; `None` derives from available parallelism.
    pub worker_count: Option<usize>,
    /// Worker ceiling for pressure scaling; `None` = 2x initial.
    pub max_workers: Option<usize>,
    pub sink_parallel_writes: bool,
    pub exceptions_enabled: bool,
    pub exceptions_max_frames: usize,
    pub exceptions_max_stack_chars: usize,
    pub serialize_in_flush: bool,
    pub strict_envelope_mode: bool,
    pub shutdown_timeout_seconds: f64,
    pub atexit_drain_enabled: bool,
    pub atexit_drain_timeout_seconds: f64,
    pub signal_handler_enabled: bool,
    pub flush_on_critical: bool,
    pub sink_circuit_breaker_enabled: bool,
    pub sink_circuit_breaker_failure_threshold: u32,
    pub sink_circuit_breaker_recovery_timeout_seconds: f64,
    pub protected_levels: Vec<String>,
    /// Bounded concurrency for the enricher stage.
    pub enricher_concurrency: usize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            log_level: None,
            max_queue_size: 10_000,
            protected_queue_size: 1_000,
            batch_max_size: 256,
            batch_timeout_seconds: 0.25,
            backpressure_wait_ms: 50,
            drop_on_full: true,
            worker_count: None,
            max_workers: None,
            sink_parallel_writes: false,
            exceptions_enabled: true,
            exceptions_max_frames: 50,
            exceptions_max_stack_chars: 20_000,
            serialize_in_flush: false,
            strict_envelope_mode: false,
            shutdown_timeout_seconds: 3.0,
            atexit_drain_enabled: true,
            atexit_drain_timeout_seconds: 2.0,
            signal_handler_enabled: true,
            flush_on_critical: false,
            sink_circuit_breaker_enabled: true,
            sink_circuit_breaker_failure_threshold: 5,
            sink_circuit_breaker_recovery_timeout_seconds: 30.0,
            protected_levels: vec!["ERROR".to_string(), "CRITICAL".to_string()],
            enricher_concurrency: 5,
        }
    }
}

/// Complete logger settings.
#[derive(Debug, Clone, Default)]
pub struct LoggerSettings {
    /// Logger name stamped onto every envelope.
    pub name: String,
    pub core: CoreSettings,
    pub tamper: TamperSettings,
    pub routing: RoutingSettings,
    pub pressure: PressureSettings,
    /// Metrics are no-ops when disabled.
    pub metrics_enabled: bool,
    /// Redaction mode applied by the stderr fallback writer.
    pub fallback_redaction: RedactMode,
    /// Extra sensitive field names for minimal fallback redaction.
    pub sensitive_fields: Vec<String>,
}

impl LoggerSettings {
    /// Settings named after the logger, everything else default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics_enabled: true,
            ..Self::default()
        }
    }

    /// Validates the whole configuration; called synchronously before
    /// anything starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.core.max_queue_size == 0 {
            return Err(PipelineError::invalid_config("max_queue_size must be > 0"));
        }
        if self.core.protected_queue_size == 0 {
            return Err(PipelineError::invalid_config(
                "protected_queue_size must be > 0",
            ));
        }
        if self.core.batch_max_size == 0 {
            return Err(PipelineError::invalid_config("batch_max_size must be > 0"));
        }
        if self.core.batch_timeout_seconds <= 0.0 {
            return Err(PipelineError::invalid_config(
                "batch_timeout_seconds must be > 0",
            ));
        }
        if let (Some(initial), Some(max)) = (self.core.worker_count, self.core.max_workers) {
            if max < initial {
                return Err(PipelineError::invalid_config(
                    "max_workers must be >= worker_count",
                ));
            }
        }
        if self.core.worker_count == Some(0) {
            return Err(PipelineError::invalid_config("worker_count must be > 0"));
        }
        if self.core.enricher_concurrency == 0 {
            return Err(PipelineError::invalid_config(
                "enricher_concurrency must be > 0",
            ));
        }

        let p = &self.pressure;
        if p.check_interval_seconds <= 0.0 {
            return Err(PipelineError::invalid_config(
                "check_interval_seconds must be > 0",
            ));
        }
        let ladder_ordered = p.escalate_to_elevated < p.escalate_to_high
            && p.escalate_to_high < p.escalate_to_critical;
        if !ladder_ordered {
            return Err(PipelineError::invalid_config(
                "escalation thresholds must be strictly increasing",
            ));
        }
        let hysteresis_sound = p.deescalate_from_elevated < p.escalate_to_elevated
            && p.deescalate_from_high < p.escalate_to_high
            && p.deescalate_from_critical < p.escalate_to_critical;
        if !hysteresis_sound {
            return Err(PipelineError::invalid_config(
                "de-escalation thresholds must sit below their escalation thresholds",
            ));
        }

        if self.routing.enabled && self.routing.rules.is_empty() {
            return Err(PipelineError::invalid_config(
                "routing.enabled requires at least one rule",
            ));
        }

        if self.tamper.enabled {
            if self.tamper.key_source == KeySource::File && self.tamper.key_file_path.is_none() {
                return Err(PipelineError::invalid_config(
                    "tamper.key_source = file requires key_file_path",
                ));
            }
            if self.tamper.key_source == KeySource::Env && self.tamper.key_env_var.is_empty() {
                return Err(PipelineError::invalid_config(
                    "tamper.key_source = env requires key_env_var",
                ));
            }
        }

        Ok(())
    }

    /// Submit-side level gate, with TTY/CI-aware default.
    pub fn effective_log_level(&self) -> String {
        match &self.core.log_level {
            Some(level) => level.to_uppercase(),
            None => default_log_level(),
        }
    }

    /// Initial worker count.
    pub fn effective_worker_count(&self) -> WorkerCount {
        match self.core.worker_count {
            Some(count) => WorkerCount::new(count),
            None => WorkerCount::from_available_parallelism(),
        }
    }

    /// Worker ceiling for pressure scaling.
    pub fn effective_max_workers(&self) -> usize {
        let initial = self.effective_worker_count().count();
        self.core
            .max_workers
            .unwrap_or(initial * 2)
            .clamp(initial, WorkerCount::MAX_WORKERS)
    }

    /// Batch policy from the core settings.
    pub fn batch_policy(&self) -> Result<BatchPolicy, PipelineError> {
        BatchPolicy::new(
            self.core.batch_max_size,
            Duration::from_secs_f64(self.core.batch_timeout_seconds),
        )
    }

    /// Circuit breaker configuration, `None` when disabled.
    pub fn breaker_config(&self) -> Option<CircuitBreakerConfig> {
        self.core
            .sink_circuit_breaker_enabled
            .then(|| CircuitBreakerConfig {
                failure_threshold: self.core.sink_circuit_breaker_failure_threshold,
                recovery_timeout: Duration::from_secs_f64(
                    self.core.sink_circuit_breaker_recovery_timeout_seconds,
                ),
            })
    }

    /// Drain deadline.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.core.shutdown_timeout_seconds.max(0.0))
    }
}

/// Default level: DEBUG on a TTY, INFO under CI or redirection.
pub fn default_log_level() -> String {
    if is_ci_environment() {
        return "INFO".to_string();
    }
    if is_tty_environment() {
        "DEBUG".to_string()
    } else {
        "INFO".to_string()
    }
}

/// Detects CI by checking for common environment variables.
pub fn is_ci_environment() -> bool {
    CI_ENV_VARS
        .iter()
        .any(|var| std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false))
}

/// True when stdout is a terminal.
pub fn is_tty_environment() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        LoggerSettings::named("root").validate().unwrap();
    }

    #[test]
    fn test_zero_queue_rejected() {
        let mut settings = LoggerSettings::named("root");
        settings.core.max_queue_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut settings = LoggerSettings::named("root");
        settings.pressure.escalate_to_high = 0.5; // below elevated (0.6)
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_hysteresis_must_sit_below_escalation() {
        let mut settings = LoggerSettings::named("root");
        settings.pressure.deescalate_from_elevated = 0.7; // above escalate (0.6)
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_file_key_source_requires_path() {
        let mut settings = LoggerSettings::named("root");
        settings.tamper.enabled = true;
        settings.tamper.key_source = KeySource::File;
        assert!(settings.validate().is_err());
        settings.tamper.key_file_path = Some(PathBuf::from("/tmp/key"));
        settings.validate().unwrap();
    }

    #[test]
    fn test_routing_enabled_requires_rules() {
        let mut settings = LoggerSettings::named("root");
        settings.routing.enabled = true;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_worker_bounds() {
        let mut settings = LoggerSettings::named("root");
        settings.core.worker_count = Some(4);
        settings.core.max_workers = Some(2);
        assert!(settings.validate().is_err());

        settings.core.max_workers = None;
        assert_eq!(settings.effective_max_workers(), 8);
    }

    #[test]
    fn test_algorithm_wire_names() {
        assert_eq!(TamperAlgorithm::HmacSha256.as_str(), "HMAC-SHA256");
        assert_eq!(TamperAlgorithm::Ed25519.as_str(), "Ed25519");
    }

    #[test]
    fn test_key_source_remote_classification() {
        assert!(!KeySource::Env.is_remote());
        assert!(!KeySource::File.is_remote());
        assert!(KeySource::AwsKms.is_remote());
        assert!(KeySource::Vault.is_remote());
    }
}
