// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chain State Persistence
//!
//! Durable per-stream state for the hash chain: the last sequence number,
//! the previous chain hash, and the key id. Persisted as sorted-key JSON at
//! `<state_dir>/<stream_id>.chainstate`.
//!
//! ## Recovery Semantics
//!
//! - Missing file: fresh genesis state, silently
//! - Corrupt file (bad JSON, bad base64, wrong hash length): genesis state
//!   with a diagnostic; the verifier will report the discontinuity, but all
//!   per-event MACs remain verifiable
//! - The on-disk state always reflects a prefix of the in-memory sealed
//!   log: writes go to a temp file, are fsynced, then renamed over the
//!   target, so a reader observes either the previous or the next state,
//!   never a partial file

use crate::infrastructure::diagnostics::Diagnostics;
use sealog_domain::services::canonical::{
    b64url_decode, b64url_encode, canonicalize, GENESIS_HASH,
};
use sealog_domain::PipelineError;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Chain state carried between sealed events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    /// Sequence number of the most recently sealed event (0 = none).
    pub seq: u64,
    /// Chain hash of the most recently sealed event (genesis = 32 zeros).
    pub prev_chain_hash: [u8; 32],
    /// Key id the chain is sealed under.
    pub key_id: String,
}

impl ChainState {
    /// Fresh state before any event has been sealed.
    pub fn genesis() -> Self {
        Self {
            seq: 0,
            prev_chain_hash: GENESIS_HASH,
            key_id: String::new(),
        }
    }
}

/// Persists chain state to disk for restart recovery.
pub struct ChainStatePersistence {
    path: PathBuf,
    diagnostics: Diagnostics,
}

impl ChainStatePersistence {
    /// Creates persistence for one stream's chain state file.
    pub fn new(state_dir: &Path, stream_id: &str, diagnostics: Diagnostics) -> Self {
        Self {
            path: state_dir.join(format!("{}.chainstate", stream_id)),
            diagnostics,
        }
    }

    /// The chain state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads state from disk, or returns genesis for a missing or corrupt
    /// file (corrupt files also emit a diagnostic).
    pub async fn load(&self) -> ChainState {
        let path = self.path.clone();
        if !path.exists() {
            return ChainState::genesis();
        }
        let read = tokio::task::spawn_blocking(move || std::fs::read_to_string(path)).await;
        let text = match read {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                self.warn_corrupt(&err.to_string());
                return ChainState::genesis();
            }
            Err(err) => {
                self.warn_corrupt(&err.to_string());
                return ChainState::genesis();
            }
        };
        match Self::parse(&text) {
            Ok(state) => state,
            Err(err) => {
                self.warn_corrupt(&err.to_string());
                ChainState::genesis()
            }
        }
    }

    fn parse(text: &str) -> Result<ChainState, PipelineError> {
        let value: Value = serde_json::from_str(text)?;
        let seq = value
            .get("seq")
            .and_then(Value::as_u64)
            .ok_or_else(|| PipelineError::integrity_error("chain state missing seq"))?;
        let encoded = value
            .get("prev_chain_hash")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::integrity_error("chain state missing prev_chain_hash"))?;
        let decoded = b64url_decode(encoded)?;
        let prev_chain_hash: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            PipelineError::integrity_error(format!(
                "chain hash must be 32 bytes, got {}",
                decoded.len()
            ))
        })?;
        let key_id = value
            .get("key_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(ChainState {
            seq,
            prev_chain_hash,
            key_id,
        })
    }

    /// Atomically persists state: write temp file, flush, fsync, rename.
    pub async fn save(&self, state: &ChainState) -> Result<(), PipelineError> {
        let mut map = Map::new();
        map.insert("key_id".to_string(), Value::String(state.key_id.clone()));
        map.insert(
            "last_updated".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );
        map.insert(
            "prev_chain_hash".to_string(),
            Value::String(b64url_encode(&state.prev_chain_hash)),
        );
        map.insert("seq".to_string(), Value::from(state.seq));
        let serialized = canonicalize(&Value::Object(map))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let temp_path = path.with_extension("tmp");
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(&serialized)?;
            file.flush()?;
            file.sync_all()?;
            std::fs::rename(&temp_path, &path)?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::internal_error(format!("chain state write task: {}", e)))?
    }

    fn warn_corrupt(&self, error: &str) {
        self.diagnostics.warn(
            "tamper",
            "chain state corrupt, resetting",
            &[("error", error)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persistence(dir: &Path) -> ChainStatePersistence {
        ChainStatePersistence::new(dir, "default", Diagnostics::disabled())
    }

    #[tokio::test]
    async fn test_missing_file_yields_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let state = persistence(dir.path()).load().await;
        assert_eq!(state, ChainState::genesis());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = persistence(dir.path());
        let state = ChainState {
            seq: 42,
            prev_chain_hash: [7u8; 32],
            key_id: "k1".to_string(),
        };
        persistence.save(&state).await.unwrap();
        let loaded = persistence.load().await;
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_saved_file_has_sorted_keys_and_z_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = persistence(dir.path());
        persistence.save(&ChainState::genesis()).await.unwrap();
        let text = std::fs::read_to_string(persistence.path()).unwrap();
        let key_id = text.find("\"key_id\"").unwrap();
        let last_updated = text.find("\"last_updated\"").unwrap();
        let prev = text.find("\"prev_chain_hash\"").unwrap();
        let seq = text.find("\"seq\"").unwrap();
        assert!(key_id < last_updated && last_updated < prev && prev < seq);
        assert!(text.contains("Z\""));
    }

    #[tokio::test]
    async fn test_truncated_file_resets_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = persistence(dir.path());
        let state = ChainState {
            seq: 9,
            prev_chain_hash: [1u8; 32],
            key_id: "k".to_string(),
        };
        persistence.save(&state).await.unwrap();
        std::fs::write(persistence.path(), b"").unwrap();
        assert_eq!(persistence.load().await, ChainState::genesis());
    }

    #[tokio::test]
    async fn test_wrong_hash_length_resets_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = persistence(dir.path());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(
            persistence.path(),
            br#"{"key_id":"k","prev_chain_hash":"AAAA","seq":3}"#,
        )
        .unwrap();
        assert_eq!(persistence.load().await, ChainState::genesis());
    }

    #[tokio::test]
    async fn test_no_partial_state_after_save() {
        // The temp file must never linger after a successful save.
        let dir = tempfile::tempdir().unwrap();
        let persistence = persistence(dir.path());
        persistence.save(&ChainState::genesis()).await.unwrap();
        let tmp = persistence.path().with_extension("tmp");
        assert!(!tmp.exists());
        assert!(persistence.path().exists());
    }
}
