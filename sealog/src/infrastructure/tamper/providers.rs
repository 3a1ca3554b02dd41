// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Providers
//!
//! Implementations of the key provider port: environment variable, local
//! file or directory, and KMS-style providers over the named `KmsClient`
//! interface.
//!
//! ## Key Material
//!
//! Raw material may be base64url-encoded or raw bytes; either way it must
//! decode to exactly 32 bytes (HMAC key or Ed25519 seed). Cached material
//! is held in zeroizing buffers and wiped on eviction.
//!
//! ## TTL Cache
//!
//! Each provider caches its key for `ttl` (default 300 s). `rotate_check`
//! reports true when the cached entry has expired, evicting it so the next
//! `get_key` refetches.

use async_trait::async_trait;
use parking_lot::Mutex;
use ring::hmac;
use sealog_domain::services::key_provider::{KeyProvider, KmsClient, KEY_LENGTH};
use sealog_domain::PipelineError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

/// Decodes base64url or raw key material, enforcing the 32-byte length.
pub fn decode_key(raw: &[u8]) -> Option<Vec<u8>> {
    if let Ok(text) = std::str::from_utf8(raw) {
        if let Ok(decoded) = sealog_domain::services::canonical::b64url_decode(text.trim()) {
            if decoded.len() == KEY_LENGTH {
                return Some(decoded);
            }
        }
    }
    (raw.len() == KEY_LENGTH).then(|| raw.to_vec())
}

struct CacheSlot {
    key: Option<Zeroizing<Vec<u8>>>,
    expires_at: Instant,
}

/// TTL cache for key material.
struct TtlCache {
    ttl: Duration,
    slot: Mutex<CacheSlot>,
}

impl TtlCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(CacheSlot {
                key: None,
                expires_at: Instant::now(),
            }),
        }
    }

    fn get(&self) -> Option<Vec<u8>> {
        let slot = self.slot.lock();
        match &slot.key {
            Some(key) if Instant::now() < slot.expires_at => Some(key.to_vec()),
            _ => None,
        }
    }

    fn set(&self, key: Option<Vec<u8>>) {
        let mut slot = self.slot.lock();
        match key {
            Some(key) => {
                slot.key = Some(Zeroizing::new(key));
                slot.expires_at = Instant::now() + self.ttl;
            }
            None => {
                slot.key = None;
            }
        }
    }

    fn rotate_check(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.key.is_some() && Instant::now() >= slot.expires_at {
            slot.key = None;
            return true;
        }
        false
    }
}

fn hmac_sign(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

fn hmac_verify(key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, data, signature).is_ok()
}

/// Key provider backed by an environment variable.
pub struct EnvKeyProvider {
    env_var: String,
    cache: TtlCache,
}

impl EnvKeyProvider {
    /// Creates a provider reading the given environment variable.
    pub fn new(env_var: impl Into<String>, ttl: Duration) -> Self {
        Self {
            env_var: env_var.into(),
            cache: TtlCache::new(ttl),
        }
    }
}

#[async_trait]
impl KeyProvider for EnvKeyProvider {
    async fn get_key(&self, _key_id: &str) -> Option<Vec<u8>> {
        if let Some(cached) = self.cache.get() {
            return Some(cached);
        }
        let key = std::env::var(&self.env_var)
            .ok()
            .and_then(|value| decode_key(value.as_bytes()));
        self.cache.set(key.clone());
        key
    }

    async fn sign(&self, key_id: &str, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let key = self.get_key(key_id).await.ok_or_else(|| {
            PipelineError::key_error(format!("key not found in env var {}", self.env_var))
        })?;
        Ok(hmac_sign(&key, data))
    }

    async fn verify(&self, key_id: &str, data: &[u8], signature: &[u8]) -> bool {
        match self.get_key(key_id).await {
            Some(key) => hmac_verify(&key, data, signature),
            None => false,
        }
    }

    async fn rotate_check(&self) -> bool {
        self.cache.rotate_check()
    }
}

/// Key provider backed by a local file or key directory.
///
/// A file path is read directly; a directory path resolves
/// `<dir>/<key_id>.key`.
pub struct FileKeyProvider {
    path: PathBuf,
    cache: TtlCache,
}

impl FileKeyProvider {
    /// Creates a provider over the given file or directory path.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            cache: TtlCache::new(ttl),
        }
    }

    async fn read_material(&self, key_id: &str) -> Option<Vec<u8>> {
        let path = if self.path.is_file() {
            self.path.clone()
        } else {
            self.path.join(format!("{}.key", key_id))
        };
        tokio::task::spawn_blocking(move || std::fs::read(path).ok())
            .await
            .ok()
            .flatten()
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    async fn get_key(&self, key_id: &str) -> Option<Vec<u8>> {
        if let Some(cached) = self.cache.get() {
            return Some(cached);
        }
        let key = self
            .read_material(key_id)
            .await
            .and_then(|raw| decode_key(&raw));
        self.cache.set(key.clone());
        key
    }

    async fn sign(&self, key_id: &str, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let key = self.get_key(key_id).await.ok_or_else(|| {
            PipelineError::key_error(format!("key file unusable: {}", self.path.display()))
        })?;
        Ok(hmac_sign(&key, data))
    }

    async fn verify(&self, key_id: &str, data: &[u8], signature: &[u8]) -> bool {
        match self.get_key(key_id).await {
            Some(key) => hmac_verify(&key, data, signature),
            None => false,
        }
    }

    async fn rotate_check(&self) -> bool {
        self.cache.rotate_check()
    }
}

/// KMS-style provider over a named remote client.
///
/// In data-key mode the client vends plaintext key material that is cached
/// and used locally. In remote-signing mode `get_key` returns `None` and
/// sign/verify round-trip through the client.
pub struct KmsKeyProvider {
    client: Arc<dyn KmsClient>,
    cache: TtlCache,
}

impl KmsKeyProvider {
    /// Creates a provider over the given remote client.
    pub fn new(client: Arc<dyn KmsClient>, ttl: Duration) -> Self {
        Self {
            client,
            cache: TtlCache::new(ttl),
        }
    }
}

#[async_trait]
impl KeyProvider for KmsKeyProvider {
    async fn get_key(&self, key_id: &str) -> Option<Vec<u8>> {
        if !self.client.supports_data_keys() {
            return None;
        }
        if let Some(cached) = self.cache.get() {
            return Some(cached);
        }
        let key = self
            .client
            .generate_data_key(key_id)
            .await
            .ok()
            .filter(|key| key.len() == KEY_LENGTH);
        self.cache.set(key.clone());
        key
    }

    async fn sign(&self, key_id: &str, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        if self.client.supports_data_keys() {
            let key = self
                .get_key(key_id)
                .await
                .ok_or_else(|| PipelineError::key_error("KMS data key unavailable"))?;
            return Ok(hmac_sign(&key, data));
        }
        self.client.sign(key_id, data).await
    }

    async fn verify(&self, key_id: &str, data: &[u8], signature: &[u8]) -> bool {
        if self.client.supports_data_keys() {
            return match self.get_key(key_id).await {
                Some(key) => hmac_verify(&key, data, signature),
                None => false,
            };
        }
        self.client
            .verify(key_id, data, signature)
            .await
            .unwrap_or(false)
    }

    async fn rotate_check(&self) -> bool {
        self.cache.rotate_check()
    }
}
