// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end sealing tests: chained HMAC sealing over a fixed key and
//! timestamp, chain-hash recomputation, and recovery from a corrupted
//! chain state file.

use sealog::infrastructure::diagnostics::Diagnostics;
use sealog::infrastructure::tamper::providers::FileKeyProvider;
use sealog::infrastructure::tamper::IntegrityEnricher;
use sealog::{LogEvent, TamperAlgorithm, TamperSettings};
use sealog_domain::services::canonical::{
    b64url_decode, b64url_encode, canonical_event_bytes, chain_hash, timestamp_str, GENESIS_HASH,
};
use sealog_domain::services::stage::Enricher;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 32-byte key 00 01 02 .. 1f, base64url per the sealing key convention.
const KEY_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

/// 2024-01-01T00:00:00Z as epoch seconds.
const FIXED_TS: f64 = 1_704_067_200.0;

fn key_bytes() -> Vec<u8> {
    b64url_decode(KEY_B64).unwrap()
}

fn event(message: &str) -> LogEvent {
    LogEvent {
        timestamp: FIXED_TS,
        level: "INFO".to_string(),
        message: message.to_string(),
        logger: "audit".to_string(),
        correlation_id: "corr-1".to_string(),
        metadata: Map::new(),
    }
}

fn tamper_settings(dir: &Path) -> TamperSettings {
    TamperSettings {
        enabled: true,
        algorithm: TamperAlgorithm::HmacSha256,
        key_id: "audit-key".to_string(),
        state_dir: dir.to_path_buf(),
        ..TamperSettings::default()
    }
}

async fn started_enricher(dir: &Path) -> IntegrityEnricher {
    let key_path = dir.join("seal.key");
    std::fs::write(&key_path, KEY_B64).unwrap();
    let provider = Arc::new(FileKeyProvider::new(&key_path, Duration::from_secs(300)));
    let enricher = IntegrityEnricher::new(
        tamper_settings(dir),
        "default",
        provider,
        Diagnostics::disabled(),
    );
    enricher.start().await.unwrap();
    enricher
}

fn integrity_of(contribution: &Map<String, Value>) -> &Map<String, Value> {
    contribution["integrity"].as_object().unwrap()
}

#[tokio::test]
async fn test_basic_chained_seal() {
    let dir = tempfile::tempdir().unwrap();
    let enricher = started_enricher(dir.path()).await;

    let events = [event("m1"), event("m2"), event("m3")];
    let mut blocks = Vec::new();
    for ev in &events {
        let contribution = enricher.enrich(ev).await.unwrap();
        blocks.push(integrity_of(&contribution).clone());
    }

    // Sequence numbers 1, 2, 3
    for (index, block) in blocks.iter().enumerate() {
        assert_eq!(block["seq"], (index + 1) as u64);
        assert_eq!(block["algo"], "HMAC-SHA256");
        assert_eq!(block["key_id"], "audit-key");
    }

    // Genesis linkage for the first event
    assert_eq!(
        blocks[0]["prev_chain_hash"].as_str().unwrap(),
        b64url_encode(&GENESIS_HASH)
    );
    assert_eq!(
        blocks[0]["prev_chain_hash"].as_str().unwrap(),
        "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
    );

    // Every event links to its predecessor
    assert_eq!(blocks[1]["prev_chain_hash"], blocks[0]["chain_hash"]);
    assert_eq!(blocks[2]["prev_chain_hash"], blocks[1]["chain_hash"]);

    // Per-event MACs verify against the canonical payload under the key
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &key_bytes());
    for (ev, block) in events.iter().zip(&blocks) {
        let payload = canonical_event_bytes(ev).unwrap();
        let mac = b64url_decode(block["mac"].as_str().unwrap()).unwrap();
        assert!(ring::hmac::verify(&key, &payload, &mac).is_ok());
    }
}

#[tokio::test]
async fn test_chain_hash_recomputes_from_parts() {
    let dir = tempfile::tempdir().unwrap();
    let enricher = started_enricher(dir.path()).await;

    let mut prev = GENESIS_HASH;
    for (index, message) in ["m1", "m2", "m3", "m4"].iter().enumerate() {
        let ev = event(message);
        let contribution = enricher.enrich(&ev).await.unwrap();
        let block = integrity_of(&contribution);

        let seq = block["seq"].as_u64().unwrap();
        assert_eq!(seq, (index + 1) as u64);

        let mac = b64url_decode(block["mac"].as_str().unwrap()).unwrap();
        let ts = timestamp_str(ev.timestamp);
        let expected = chain_hash(&prev, &mac, seq, &ts);
        let actual = b64url_decode(block["chain_hash"].as_str().unwrap()).unwrap();
        assert_eq!(actual, expected.to_vec());

        // Independent recomputation through a raw hasher
        let mut hasher = Sha256::new();
        hasher.update(prev);
        hasher.update(&mac);
        hasher.update(seq.to_be_bytes());
        hasher.update(ts.as_bytes());
        let raw: [u8; 32] = hasher.finalize().into();
        assert_eq!(actual, raw.to_vec());

        prev = expected;
    }
}

#[tokio::test]
async fn test_timestamp_string_uses_float_rendering() {
    // The chain input renders whole-second floats with a trailing .0
    assert_eq!(timestamp_str(FIXED_TS), "1704067200.0");
    assert_eq!(timestamp_str(1_704_067_200.25), "1704067200.25");
}

#[tokio::test]
async fn test_chain_state_recovery_after_corruption() {
    let dir = tempfile::tempdir().unwrap();

    // First run: seal three events, stop to persist the chain state
    let enricher = started_enricher(dir.path()).await;
    let mut macs = Vec::new();
    for message in ["m1", "m2", "m3"] {
        let contribution = enricher.enrich(&event(message)).await.unwrap();
        macs.push(
            integrity_of(&contribution)["mac"]
                .as_str()
                .unwrap()
                .to_string(),
        );
    }
    enricher.stop().await.unwrap();

    // Corrupt the chain state (truncate to zero bytes) and restart
    let state_path = dir.path().join("default.chainstate");
    assert!(state_path.exists());
    std::fs::write(&state_path, b"").unwrap();

    let restarted = started_enricher(dir.path()).await;
    let contribution = restarted.enrich(&event("after-restart")).await.unwrap();
    let block = integrity_of(&contribution);

    // The chain restarts from genesis: a discontinuity a verifier will
    // flag at the restart boundary
    assert_eq!(block["seq"], 1u64);
    assert_eq!(
        block["prev_chain_hash"].as_str().unwrap(),
        b64url_encode(&GENESIS_HASH)
    );

    // But all earlier MACs still verify under the key
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &key_bytes());
    for (message, mac) in ["m1", "m2", "m3"].iter().zip(&macs) {
        let payload = canonical_event_bytes(&event(message)).unwrap();
        let mac = b64url_decode(mac).unwrap();
        assert!(ring::hmac::verify(&key, &payload, &mac).is_ok());
    }
}

#[tokio::test]
async fn test_seal_covers_metadata_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let enricher = started_enricher(dir.path()).await;

    let mut ev = event("payload");
    ev.metadata
        .insert("user".to_string(), Value::String("alice".to_string()));
    let contribution = enricher.enrich(&ev).await.unwrap();
    let mac = b64url_decode(integrity_of(&contribution)["mac"].as_str().unwrap()).unwrap();

    // Tampering with metadata after sealing breaks MAC verification
    let mut tampered = ev.clone();
    tampered
        .metadata
        .insert("user".to_string(), Value::String("mallory".to_string()));

    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &key_bytes());
    let clean_payload = canonical_event_bytes(&ev).unwrap();
    let tampered_payload = canonical_event_bytes(&tampered).unwrap();
    assert!(ring::hmac::verify(&key, &clean_payload, &mac).is_ok());
    assert!(ring::hmac::verify(&key, &tampered_payload, &mac).is_err());
}
