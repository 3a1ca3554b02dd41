// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Integrity Enricher
//!
//! Attaches the tamper-evidence block to each event: a per-event MAC
//! (HMAC-SHA256 or Ed25519), a monotonically increasing sequence number,
//! and a hash chain linking every sealed event to its predecessor.
//!
//! ## Sealing
//!
//! 1. Canonicalize the event excluding any existing `integrity` block
//! 2. `mac = HMAC-SHA256(key, payload)` or `Ed25519_sign(sk, payload)`
//! 3. `chain_hash = SHA-256(prev_chain_hash || mac || be_u64(seq) || ts_str)`
//! 4. Advance the per-stream chain state under an exclusive lock
//!
//! The enricher runs inside the parallel enrichment stage but serializes
//! its chain updates internally, so `seq` is strictly monotonic per stream
//! across the whole process.
//!
//! ## Failure Semantics
//!
//! Missing key material or an unusable algorithm never blocks the
//! pipeline: the enricher contributes nothing, emits one diagnostic per
//! cause, and events continue unsealed. A persistence failure on stop is
//! logged; the last successfully saved state is the recovery point.

use crate::infrastructure::config::{TamperAlgorithm, TamperSettings};
use crate::infrastructure::diagnostics::Diagnostics;
use crate::infrastructure::tamper::chain_state::{ChainState, ChainStatePersistence};
use async_trait::async_trait;
use ring::signature::{Ed25519KeyPair, KeyPair};
use sealog_domain::services::canonical::{
    b64url_encode, canonical_event_bytes, chain_hash, timestamp_str,
};
use sealog_domain::services::key_provider::KeyProvider;
use sealog_domain::services::stage::Enricher;
use sealog_domain::{LogEvent, PipelineError};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

enum SigningMaterial {
    Hmac { key: ring::hmac::Key },
    Ed25519 { keypair: Ed25519KeyPair },
}

impl SigningMaterial {
    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            SigningMaterial::Hmac { key } => ring::hmac::sign(key, payload).as_ref().to_vec(),
            SigningMaterial::Ed25519 { keypair } => keypair.sign(payload).as_ref().to_vec(),
        }
    }
}

struct EnricherState {
    material: Option<SigningMaterial>,
    chain: ChainState,
    persistence: Option<ChainStatePersistence>,
}

/// Enricher that adds tamper-evident MAC and chain fields.
pub struct IntegrityEnricher {
    settings: TamperSettings,
    stream_id: String,
    provider: Arc<dyn KeyProvider>,
    diagnostics: Diagnostics,
    state: Mutex<EnricherState>,
    key_warned: AtomicBool,
}

impl IntegrityEnricher {
    /// Creates an integrity enricher for one stream.
    pub fn new(
        settings: TamperSettings,
        stream_id: impl Into<String>,
        provider: Arc<dyn KeyProvider>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            settings,
            stream_id: stream_id.into(),
            provider,
            diagnostics,
            state: Mutex::new(EnricherState {
                material: None,
                chain: ChainState::genesis(),
                persistence: None,
            }),
            key_warned: AtomicBool::new(false),
        }
    }

    /// The stream whose chain this enricher owns.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Current sequence number (for drain reporting and tests).
    pub async fn current_seq(&self) -> u64 {
        self.state.lock().await.chain.seq
    }

    /// Ed25519 verification key, when sealing with Ed25519.
    pub async fn public_key(&self) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        match &state.material {
            Some(SigningMaterial::Ed25519 { keypair }) => {
                Some(keypair.public_key().as_ref().to_vec())
            }
            _ => None,
        }
    }

    fn warn_key_once(&self, message: &str, detail: &str) {
        if !self.key_warned.swap(true, Ordering::SeqCst) && self.settings.alert_on_failure {
            self.diagnostics
                .warn("tamper", message, &[("detail", detail)]);
        }
    }

    fn build_material(&self, raw: Vec<u8>) -> Option<SigningMaterial> {
        // Our copy of the key material is wiped as soon as ring owns it.
        let raw = Zeroizing::new(raw);
        match self.settings.algorithm {
            TamperAlgorithm::HmacSha256 => Some(SigningMaterial::Hmac {
                key: ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &raw),
            }),
            TamperAlgorithm::Ed25519 => match Ed25519KeyPair::from_seed_unchecked(&raw) {
                Ok(keypair) => Some(SigningMaterial::Ed25519 { keypair }),
                Err(_) => {
                    self.warn_key_once("failed to create signing key", "ed25519 seed rejected");
                    None
                }
            },
        }
    }
}

#[async_trait]
impl Enricher for IntegrityEnricher {
    fn name(&self) -> &str {
        "tamper-sealed"
    }

    async fn start(&self) -> Result<(), PipelineError> {
        if !self.settings.enabled {
            return Ok(());
        }
        let persistence = ChainStatePersistence::new(
            &self.settings.state_dir,
            &self.stream_id,
            self.diagnostics.clone(),
        );
        let mut chain = persistence.load().await;
        if chain.key_id.is_empty() {
            chain.key_id = self.settings.key_id.clone();
        }

        let material = match self.provider.get_key(&self.settings.key_id).await {
            Some(raw) => self.build_material(raw),
            None => {
                self.warn_key_once("signing key unavailable", "provider returned no key");
                None
            }
        };

        let mut state = self.state.lock().await;
        state.material = material;
        state.chain = chain;
        state.persistence = Some(persistence);
        Ok(())
    }

    async fn stop(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if let Some(persistence) = &state.persistence {
            let chain = state.chain.clone();
            if let Err(err) = persistence.save(&chain).await {
                self.diagnostics.warn(
                    "tamper",
                    "failed to persist chain state",
                    &[("error", &err.to_string())],
                );
            }
        }
        // Best-effort clearing of sensitive material
        state.material = None;
        Ok(())
    }

    async fn enrich(&self, event: &LogEvent) -> Result<Map<String, Value>, PipelineError> {
        if !self.settings.enabled {
            return Ok(Map::new());
        }

        let payload = match canonical_event_bytes(event) {
            Ok(payload) => payload,
            Err(err) => {
                self.diagnostics.warn(
                    "tamper",
                    "event canonicalization failed",
                    &[("error", &err.to_string())],
                );
                return Ok(Map::new());
            }
        };
        let ts_str = timestamp_str(event.timestamp);

        let mut state = self.state.lock().await;
        let Some(material) = &state.material else {
            self.warn_key_once("signing key unavailable", "sealing disabled for this run");
            return Ok(Map::new());
        };

        let seq = state.chain.seq + 1;
        let mac = material.sign(&payload);
        let hash = chain_hash(&state.chain.prev_chain_hash, &mac, seq, &ts_str);
        let prev = state.chain.prev_chain_hash;

        state.chain.seq = seq;
        state.chain.prev_chain_hash = hash;
        if state.chain.key_id.is_empty() {
            state.chain.key_id = self.settings.key_id.clone();
        }
        drop(state);

        let mut integrity = Map::new();
        integrity.insert("seq".to_string(), Value::from(seq));
        integrity.insert("mac".to_string(), Value::String(b64url_encode(&mac)));
        integrity.insert(
            "algo".to_string(),
            Value::String(self.settings.algorithm.as_str().to_string()),
        );
        integrity.insert(
            "key_id".to_string(),
            Value::String(self.settings.key_id.clone()),
        );
        integrity.insert(
            "chain_hash".to_string(),
            Value::String(b64url_encode(&hash)),
        );
        integrity.insert(
            "prev_chain_hash".to_string(),
            Value::String(b64url_encode(&prev)),
        );

        let mut contribution = Map::new();
        contribution.insert("integrity".to_string(), Value::Object(integrity));
        Ok(contribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::KeySource;
    use crate::infrastructure::tamper::providers::FileKeyProvider;
    use sealog_domain::services::canonical::{b64url_decode, GENESIS_HASH};
    use std::path::Path;
    use std::time::Duration;

    const KEY: [u8; 32] = [9u8; 32];

    fn settings(state_dir: &Path, algorithm: TamperAlgorithm) -> TamperSettings {
        TamperSettings {
            enabled: true,
            algorithm,
            key_id: "test-key".to_string(),
            key_source: KeySource::File,
            state_dir: state_dir.to_path_buf(),
            ..TamperSettings::default()
        }
    }

    fn event(message: &str) -> LogEvent {
        LogEvent {
            timestamp: 1704067200.0,
            level: "INFO".to_string(),
            message: message.to_string(),
            logger: "root".to_string(),
            correlation_id: "c".to_string(),
            metadata: Map::new(),
        }
    }

    async fn enricher_with_key(dir: &Path, algorithm: TamperAlgorithm) -> IntegrityEnricher {
        let key_path = dir.join("seal.key");
        std::fs::write(&key_path, KEY).unwrap();
        let provider = Arc::new(FileKeyProvider::new(&key_path, Duration::from_secs(300)));
        let enricher = IntegrityEnricher::new(
            settings(dir, algorithm),
            "default",
            provider,
            Diagnostics::disabled(),
        );
        enricher.start().await.unwrap();
        enricher
    }

    #[tokio::test]
    async fn test_sequence_and_chain_linkage() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = enricher_with_key(dir.path(), TamperAlgorithm::HmacSha256).await;

        let first = enricher.enrich(&event("m1")).await.unwrap();
        let second = enricher.enrich(&event("m2")).await.unwrap();

        let first = first["integrity"].as_object().unwrap();
        let second = second["integrity"].as_object().unwrap();

        assert_eq!(first["seq"], 1);
        assert_eq!(second["seq"], 2);
        assert_eq!(
            b64url_decode(first["prev_chain_hash"].as_str().unwrap()).unwrap(),
            GENESIS_HASH.to_vec()
        );
        assert_eq!(second["prev_chain_hash"], first["chain_hash"]);
    }

    #[tokio::test]
    async fn test_hmac_mac_verifies_against_canonical_payload() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = enricher_with_key(dir.path(), TamperAlgorithm::HmacSha256).await;

        let ev = event("verify-me");
        let contribution = enricher.enrich(&ev).await.unwrap();
        let mac = b64url_decode(
            contribution["integrity"].as_object().unwrap()["mac"]
                .as_str()
                .unwrap(),
        )
        .unwrap();

        let payload = canonical_event_bytes(&ev).unwrap();
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &KEY);
        assert!(ring::hmac::verify(&key, &payload, &mac).is_ok());
    }

    #[tokio::test]
    async fn test_mac_ignores_existing_integrity_block() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = enricher_with_key(dir.path(), TamperAlgorithm::HmacSha256).await;

        let plain = event("same");
        let mut sealed_before = event("same");
        sealed_before.metadata.insert(
            "integrity".to_string(),
            serde_json::json!({"seq": 99, "mac": "zzz"}),
        );

        let a = enricher.enrich(&plain).await.unwrap();
        let b = enricher.enrich(&sealed_before).await.unwrap();
        let mac_a = a["integrity"].as_object().unwrap()["mac"].clone();
        let mac_b = b["integrity"].as_object().unwrap()["mac"].clone();
        assert_eq!(mac_a, mac_b);
    }

    #[tokio::test]
    async fn test_ed25519_signature_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = enricher_with_key(dir.path(), TamperAlgorithm::Ed25519).await;

        let ev = event("signed");
        let contribution = enricher.enrich(&ev).await.unwrap();
        let mac = b64url_decode(
            contribution["integrity"].as_object().unwrap()["mac"]
                .as_str()
                .unwrap(),
        )
        .unwrap();

        let public_key = enricher.public_key().await.unwrap();
        let payload = canonical_event_bytes(&ev).unwrap();
        let verifier =
            ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, public_key);
        assert!(verifier.verify(&payload, &mac).is_ok());
    }

    #[tokio::test]
    async fn test_missing_key_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FileKeyProvider::new(
            dir.path().join("nope.key"),
            Duration::from_secs(300),
        ));
        let enricher = IntegrityEnricher::new(
            settings(dir.path(), TamperAlgorithm::HmacSha256),
            "default",
            provider,
            Diagnostics::disabled(),
        );
        enricher.start().await.unwrap();
        let contribution = enricher.enrich(&event("m")).await.unwrap();
        assert!(contribution.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("seal.key");
        std::fs::write(&key_path, KEY).unwrap();
        let provider = Arc::new(FileKeyProvider::new(&key_path, Duration::from_secs(300)));
        let mut tamper = settings(dir.path(), TamperAlgorithm::HmacSha256);
        tamper.enabled = false;
        let enricher = IntegrityEnricher::new(tamper, "default", provider, Diagnostics::disabled());
        enricher.start().await.unwrap();
        assert!(enricher.enrich(&event("m")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = enricher_with_key(dir.path(), TamperAlgorithm::HmacSha256).await;
        enricher.enrich(&event("m1")).await.unwrap();
        let second = enricher.enrich(&event("m2")).await.unwrap();
        let last_hash = second["integrity"].as_object().unwrap()["chain_hash"].clone();
        enricher.stop().await.unwrap();

        // Restart resumes from persisted state
        let key_path = dir.path().join("seal.key");
        let provider = Arc::new(FileKeyProvider::new(&key_path, Duration::from_secs(300)));
        let restarted = IntegrityEnricher::new(
            settings(dir.path(), TamperAlgorithm::HmacSha256),
            "default",
            provider,
            Diagnostics::disabled(),
        );
        restarted.start().await.unwrap();
        let third = restarted.enrich(&event("m3")).await.unwrap();
        let third = third["integrity"].as_object().unwrap();
        assert_eq!(third["seq"], 3);
        assert_eq!(third["prev_chain_hash"], last_hash);
    }

    #[tokio::test]
    async fn test_corrupt_state_restarts_from_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = enricher_with_key(dir.path(), TamperAlgorithm::HmacSha256).await;
        enricher.enrich(&event("m1")).await.unwrap();
        enricher.stop().await.unwrap();

        // Truncate the chain state file to zero bytes
        let state_path = dir.path().join("default.chainstate");
        std::fs::write(&state_path, b"").unwrap();

        let key_path = dir.path().join("seal.key");
        let provider = Arc::new(FileKeyProvider::new(&key_path, Duration::from_secs(300)));
        let restarted = IntegrityEnricher::new(
            settings(dir.path(), TamperAlgorithm::HmacSha256),
            "default",
            provider,
            Diagnostics::disabled(),
        );
        restarted.start().await.unwrap();
        let next = restarted.enrich(&event("m2")).await.unwrap();
        let next = next["integrity"].as_object().unwrap();
        assert_eq!(next["seq"], 1);
        assert_eq!(
            b64url_decode(next["prev_chain_hash"].as_str().unwrap()).unwrap(),
            GENESIS_HASH.to_vec()
        );
    }
}
