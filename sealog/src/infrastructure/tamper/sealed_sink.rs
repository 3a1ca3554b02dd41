// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sealed Sink Wrapper
//!
//! Wraps a rotating sink and observes the events flowing through it,
//! accumulating per-file metadata (record count, first/last sequence and
//! timestamp, root chain hash) and emitting a signed manifest alongside
//! every closed file.
//!
//! ## Rotation Protocol
//!
//! 1. The inner sink closes its current file and opens the next one
//! 2. A signed manifest for the closed file is written to
//!    `<file>.manifest.json`
//! 3. The closed file is optionally gzipped (8 KiB streaming, fsync,
//!    atomic rename)
//! 4. Only then is the new file's metadata installed, with
//!    `continues_from` linking to the closed file's root chain hash unless
//!    `rotate_chain` resets continuity
//!
//! On stop, a final manifest is emitted when the current file holds
//! records. Manifest signing uses the same algorithm and key as the
//! integrity enricher; the signature covers the canonical JSON of every
//! manifest field except `signature` itself.

use crate::infrastructure::config::{TamperAlgorithm, TamperSettings};
use crate::infrastructure::diagnostics::Diagnostics;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ring::signature::{Ed25519KeyPair, KeyPair};
use sealog_domain::services::canonical::{b64url_decode, b64url_encode, canonicalize};
use sealog_domain::services::key_provider::KeyProvider;
use sealog_domain::services::sink::{Sink, SinkCapabilities};
use sealog_domain::{LogEvent, PipelineError, SerializedView};
use serde_json::{Map, Value};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

/// Gzip streaming chunk size.
const GZIP_CHUNK: usize = 8 * 1024;

/// Tracks metadata for one open output file.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub filename: String,
    pub created_ts: DateTime<Utc>,
    pub record_count: u64,
    pub first_seq: Option<u64>,
    pub last_seq: Option<u64>,
    pub first_ts: Option<f64>,
    pub last_ts: Option<f64>,
    pub root_chain_hash: Option<Vec<u8>>,
    pub continues_from: Option<String>,
}

impl FileMetadata {
    fn open(filename: String, continues_from: Option<String>) -> Self {
        Self {
            filename,
            created_ts: Utc::now(),
            record_count: 0,
            first_seq: None,
            last_seq: None,
            first_ts: None,
            last_ts: None,
            root_chain_hash: None,
            continues_from,
        }
    }
}

enum ManifestKey {
    Hmac { key: ring::hmac::Key },
    Ed25519 { keypair: Ed25519KeyPair },
}

/// Generates and verifies signed manifests for closed files.
pub struct ManifestSigner {
    algorithm: TamperAlgorithm,
    key_id: String,
    key: Option<ManifestKey>,
}

impl ManifestSigner {
    /// Creates a signer; `None` key material produces unsigned manifests.
    pub fn new(
        algorithm: TamperAlgorithm,
        key_id: impl Into<String>,
        raw: Option<Vec<u8>>,
    ) -> Self {
        let key = raw.and_then(|raw| {
            let raw = Zeroizing::new(raw);
            match algorithm {
                TamperAlgorithm::HmacSha256 => Some(ManifestKey::Hmac {
                    key: ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &raw),
                }),
                TamperAlgorithm::Ed25519 => Ed25519KeyPair::from_seed_unchecked(&raw)
                    .ok()
                    .map(|keypair| ManifestKey::Ed25519 { keypair }),
            }
        });
        Self {
            algorithm,
            key_id: key_id.into(),
            key,
        }
    }

    /// True when manifests will carry signatures.
    pub fn is_signing(&self) -> bool {
        self.key.is_some()
    }

    /// Builds the manifest object for a closed file, signed when key
    /// material is available.
    pub fn generate(
        &self,
        metadata: &FileMetadata,
        closed_ts: DateTime<Utc>,
    ) -> Result<Value, PipelineError> {
        let mut manifest = Map::new();
        manifest.insert("version".to_string(), Value::String("1.0".to_string()));
        manifest.insert("file".to_string(), Value::String(metadata.filename.clone()));
        manifest.insert(
            "created_ts".to_string(),
            Value::String(
                metadata
                    .created_ts
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        );
        manifest.insert(
            "closed_ts".to_string(),
            Value::String(closed_ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        manifest.insert(
            "record_count".to_string(),
            Value::from(metadata.record_count),
        );
        manifest.insert("first_seq".to_string(), opt_u64(metadata.first_seq));
        manifest.insert("last_seq".to_string(), opt_u64(metadata.last_seq));
        manifest.insert("first_ts".to_string(), opt_f64(metadata.first_ts));
        manifest.insert("last_ts".to_string(), opt_f64(metadata.last_ts));
        manifest.insert(
            "root_chain_hash".to_string(),
            metadata
                .root_chain_hash
                .as_ref()
                .map(|hash| Value::String(b64url_encode(hash)))
                .unwrap_or(Value::Null),
        );
        manifest.insert(
            "algo".to_string(),
            Value::String(self.algorithm.as_str().to_string()),
        );
        manifest.insert("key_id".to_string(), Value::String(self.key_id.clone()));
        manifest.insert(
            "signature_algo".to_string(),
            Value::String(self.algorithm.as_str().to_string()),
        );
        manifest.insert(
            "integrity_version".to_string(),
            Value::String("1.0".to_string()),
        );
        if let Some(continues_from) = &metadata.continues_from {
            manifest.insert(
                "continues_from".to_string(),
                Value::String(continues_from.clone()),
            );
        }

        if let Some(key) = &self.key {
            let payload = canonical_manifest_payload(&Value::Object(manifest.clone()))?;
            let signature = match key {
                ManifestKey::Hmac { key } => ring::hmac::sign(key, &payload).as_ref().to_vec(),
                ManifestKey::Ed25519 { keypair } => keypair.sign(&payload).as_ref().to_vec(),
            };
            manifest.insert(
                "signature".to_string(),
                Value::String(b64url_encode(&signature)),
            );
        }
        Ok(Value::Object(manifest))
    }

    /// Verifies a manifest's signature against its canonical payload.
    pub fn verify(&self, manifest: &Value) -> bool {
        let Some(signature) = manifest.get("signature").and_then(Value::as_str) else {
            return false;
        };
        let Ok(signature) = b64url_decode(signature) else {
            return false;
        };
        let Ok(payload) = canonical_manifest_payload(manifest) else {
            return false;
        };
        match &self.key {
            Some(ManifestKey::Hmac { key }) => {
                ring::hmac::verify(key, &payload, &signature).is_ok()
            }
            Some(ManifestKey::Ed25519 { keypair }) => {
                let verifier = ring::signature::UnparsedPublicKey::new(
                    &ring::signature::ED25519,
                    keypair.public_key().as_ref().to_vec(),
                );
                verifier.verify(&payload, &signature).is_ok()
            }
            None => false,
        }
    }
}

/// Canonical manifest bytes: sorted keys, compact, `signature` excluded.
pub fn canonical_manifest_payload(manifest: &Value) -> Result<Vec<u8>, PipelineError> {
    let mut payload = manifest.clone();
    if let Some(map) = payload.as_object_mut() {
        map.remove("signature");
    }
    canonicalize(&payload)
}

fn opt_u64(value: Option<u64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn opt_f64(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

struct SealedState {
    signer: Option<ManifestSigner>,
    current: Option<FileMetadata>,
    previous_root: Option<String>,
}

/// Sink wrapper that emits signed manifests on rotation.
pub struct SealedSink {
    name: String,
    inner: Arc<dyn Sink>,
    settings: TamperSettings,
    provider: Arc<dyn KeyProvider>,
    diagnostics: Diagnostics,
    state: Mutex<SealedState>,
}

impl SealedSink {
    /// Wraps the inner sink with sealing observation.
    pub fn new(
        inner: Arc<dyn Sink>,
        settings: TamperSettings,
        provider: Arc<dyn KeyProvider>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            name: format!("sealed:{}", inner.name()),
            inner,
            settings,
            provider,
            diagnostics,
            state: Mutex::new(SealedState {
                signer: None,
                current: None,
                previous_root: None,
            }),
        }
    }

    fn current_filename(&self) -> String {
        self.inner
            .current_path()
            .unwrap_or_else(|| self.settings.state_dir.join("sealog.log"))
            .to_string_lossy()
            .into_owned()
    }

    fn next_metadata(&self, previous_root: &Option<String>) -> FileMetadata {
        let continues_from = if self.settings.rotate_chain {
            None
        } else {
            previous_root.clone()
        };
        FileMetadata::open(self.current_filename(), continues_from)
    }

    /// Emits the manifest for a closed file and returns its root hash.
    async fn emit_manifest(
        &self,
        signer: &ManifestSigner,
        closed: &FileMetadata,
    ) -> Result<Option<String>, PipelineError> {
        let manifest = signer.generate(closed, Utc::now())?;
        let manifest_path = PathBuf::from(format!("{}.manifest.json", closed.filename));
        let bytes = canonicalize(&manifest)?;
        let fsync = self.settings.fsync_on_rotate;
        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            if let Some(parent) = manifest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(&manifest_path)?;
            file.write_all(&bytes)?;
            file.flush()?;
            if fsync {
                file.sync_all()?;
            }
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::internal_error(format!("manifest write task: {}", e)))??;

        if self.settings.compress_rotated {
            if let Err(err) = compress_file(Path::new(&closed.filename)).await {
                self.diagnostics.warn(
                    "tamper",
                    "failed to compress rotated file",
                    &[("file", &closed.filename), ("error", &err.to_string())],
                );
            }
        }

        if self.settings.verify_on_close && signer.is_signing() && !signer.verify(&manifest) {
            self.diagnostics.warn(
                "tamper",
                "manifest verification failed on close",
                &[("file", &closed.filename)],
            );
        }

        Ok(manifest
            .get("root_chain_hash")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn fsync_current(&self) {
        let Some(path) = self.inner.current_path() else {
            return;
        };
        let _ = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let file = std::fs::File::open(path)?;
            file.sync_data()
        })
        .await;
    }
}

#[async_trait]
impl Sink for SealedSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            // Metadata accumulation needs the structured event, so the
            // serialized fast path is declined even if the inner sink
            // supports it.
            serialized_writes: false,
            rotation: true,
            health_check: true,
        }
    }

    async fn start(&self) -> Result<(), PipelineError> {
        self.inner.start().await?;
        let key = self.provider.get_key(&self.settings.key_id).await;
        if key.is_none() && self.settings.alert_on_failure {
            self.diagnostics.warn(
                "tamper",
                "manifest signing key unavailable",
                &[("key_id", &self.settings.key_id)],
            );
        }
        let signer = ManifestSigner::new(self.settings.algorithm, &self.settings.key_id, key);

        let mut state = self.state.lock().await;
        state.signer = Some(signer);
        let previous_root = state.previous_root.clone();
        state.current = Some(self.next_metadata(&previous_root));
        Ok(())
    }

    async fn stop(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.lock().await;
            let closed = state.current.take();
            let signer = state.signer.take();
            if let (Some(signer), Some(metadata)) = (&signer, closed) {
                if metadata.record_count > 0 {
                    match self.emit_manifest(signer, &metadata).await {
                        Ok(root) => state.previous_root = root,
                        Err(err) => self.diagnostics.warn(
                            "tamper",
                            "failed to emit final manifest",
                            &[("error", &err.to_string())],
                        ),
                    }
                }
            }
            state.signer = signer;
        }
        self.inner.stop().await
    }

    async fn write(&self, event: &LogEvent) -> Result<(), PipelineError> {
        {
            let mut state = self.state.lock().await;
            if state.current.is_none() {
                let previous_root = state.previous_root.clone();
                state.current = Some(self.next_metadata(&previous_root));
            }
            if let Some(metadata) = state.current.as_mut() {
                let integrity = event.integrity();
                let seq = integrity
                    .and_then(|block| block.get("seq"))
                    .and_then(Value::as_u64);
                let chain_hash = integrity
                    .and_then(|block| block.get("chain_hash"))
                    .and_then(Value::as_str)
                    .and_then(|encoded| b64url_decode(encoded).ok());

                if metadata.first_seq.is_none() {
                    metadata.first_seq = seq;
                    metadata.first_ts = Some(event.timestamp);
                }
                metadata.last_seq = seq;
                metadata.last_ts = Some(event.timestamp);
                metadata.record_count += 1;
                if let Some(hash) = chain_hash {
                    metadata.root_chain_hash = Some(hash);
                }
            }
        }

        self.inner.write(event).await?;

        if self.settings.fsync_on_write {
            self.fsync_current().await;
        }
        Ok(())
    }

    async fn write_serialized(&self, _view: &SerializedView) -> Result<(), PipelineError> {
        Err(PipelineError::Unsupported(
            "sealed sink observes structured writes only".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    async fn rotate(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        let closed = state.current.take();
        let signer = state.signer.take();

        self.inner.rotate().await?;

        if let (Some(signer), Some(closed)) = (&signer, closed) {
            match self.emit_manifest(signer, &closed).await {
                Ok(root) => state.previous_root = root,
                Err(err) => self.diagnostics.warn(
                    "tamper",
                    "failed to emit manifest",
                    &[("file", &closed.filename), ("error", &err.to_string())],
                ),
            }
        }
        state.signer = signer;

        let previous_root = state.previous_root.clone();
        state.current = Some(self.next_metadata(&previous_root));
        Ok(())
    }

    fn current_path(&self) -> Option<PathBuf> {
        self.inner.current_path()
    }
}

/// Gzips `src` to `src.gz` with streaming, fsync, and atomic rename; the
/// source file is removed on success.
async fn compress_file(src: &Path) -> Result<(), PipelineError> {
    let src = src.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
        if !src.exists() {
            return Ok(());
        }
        let dest = PathBuf::from(format!("{}.gz", src.display()));
        let temp = PathBuf::from(format!("{}.tmp", dest.display()));

        let mut input = std::fs::File::open(&src)?;
        let output = std::fs::File::create(&temp)?;
        let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
        let mut buffer = [0u8; GZIP_CHUNK];
        loop {
            let read = input.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            encoder.write_all(&buffer[..read])?;
        }
        let output = encoder.finish()?;
        output.sync_all()?;
        std::fs::rename(&temp, &dest)?;
        let _ = std::fs::remove_file(&src);
        Ok(())
    })
    .await
    .map_err(|e| PipelineError::internal_error(format!("gzip task: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> FileMetadata {
        FileMetadata {
            filename: "audit-00001.jsonl".to_string(),
            created_ts: Utc::now(),
            record_count: 2,
            first_seq: Some(1),
            last_seq: Some(2),
            first_ts: Some(1.0),
            last_ts: Some(2.0),
            root_chain_hash: Some(vec![5u8; 32]),
            continues_from: None,
        }
    }

    #[test]
    fn test_manifest_fields_and_signature() {
        let signer = ManifestSigner::new(TamperAlgorithm::HmacSha256, "k1", Some(vec![3u8; 32]));
        let manifest = signer.generate(&metadata(), Utc::now()).unwrap();

        assert_eq!(manifest["version"], "1.0");
        assert_eq!(manifest["integrity_version"], "1.0");
        assert_eq!(manifest["record_count"], 2);
        assert_eq!(manifest["algo"], "HMAC-SHA256");
        assert_eq!(manifest["signature_algo"], "HMAC-SHA256");
        assert!(manifest.get("continues_from").is_none());
        assert!(manifest["signature"].is_string());
        assert!(signer.verify(&manifest));
    }

    #[test]
    fn test_manifest_signature_covers_all_fields() {
        let signer = ManifestSigner::new(TamperAlgorithm::HmacSha256, "k1", Some(vec![3u8; 32]));
        let mut manifest = signer.generate(&metadata(), Utc::now()).unwrap();
        manifest["record_count"] = Value::from(999);
        assert!(!signer.verify(&manifest));
    }

    #[test]
    fn test_unsigned_manifest_without_key() {
        let signer = ManifestSigner::new(TamperAlgorithm::HmacSha256, "k1", None);
        let manifest = signer.generate(&metadata(), Utc::now()).unwrap();
        assert!(manifest.get("signature").is_none());
        assert!(!signer.verify(&manifest));
    }

    #[test]
    fn test_ed25519_manifest_signature() {
        let signer = ManifestSigner::new(TamperAlgorithm::Ed25519, "k1", Some(vec![7u8; 32]));
        let manifest = signer.generate(&metadata(), Utc::now()).unwrap();
        assert!(signer.verify(&manifest));
    }

    #[test]
    fn test_continues_from_included_when_present() {
        let signer = ManifestSigner::new(TamperAlgorithm::HmacSha256, "k1", Some(vec![3u8; 32]));
        let mut meta = metadata();
        meta.continues_from = Some("prevroot".to_string());
        let manifest = signer.generate(&meta, Utc::now()).unwrap();
        assert_eq!(manifest["continues_from"], "prevroot");
        assert!(signer.verify(&manifest));
    }

    #[tokio::test]
    async fn test_compress_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.jsonl");
        let payload = b"line one\nline two\n".repeat(1000);
        std::fs::write(&src, &payload).unwrap();

        compress_file(&src).await.unwrap();

        assert!(!src.exists());
        let gz_path = dir.path().join("data.jsonl.gz");
        assert!(gz_path.exists());

        let mut decoder = flate2::read::GzDecoder::new(std::fs::File::open(&gz_path).unwrap());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, payload);
    }
}
