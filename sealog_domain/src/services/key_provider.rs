// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Provider Contract
//!
//! Ports for retrieving and using signing keys. Local providers (environment
//! variable, key file) return raw 32-byte key material; KMS-style providers
//! may instead perform sign/verify remotely, in which case `get_key` returns
//! `None` and callers route through `sign`/`verify`.
//!
//! Key material is cached with a TTL; `rotate_check` reports (and evicts)
//! expired cache entries so callers can refresh before the next signature.
//!
//! The remote side of a KMS-style provider is modeled by the [`KmsClient`]
//! interface; concrete vendor transports live outside this system.

use crate::error::PipelineError;
use async_trait::async_trait;

/// Required length of raw key material (HMAC key or Ed25519 seed).
pub const KEY_LENGTH: usize = 32;

/// Port for retrieving and using signing keys.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Retrieves raw key material by ID.
    ///
    /// Returns `None` when the key is unavailable or when the provider only
    /// supports remote signing.
    async fn get_key(&self, key_id: &str) -> Option<Vec<u8>>;

    /// Signs data using the key (locally or remotely).
    async fn sign(&self, key_id: &str, data: &[u8]) -> Result<Vec<u8>, PipelineError>;

    /// Verifies a signature using the key.
    async fn verify(&self, key_id: &str, data: &[u8], signature: &[u8]) -> bool;

    /// Returns true when a cached key has expired and was evicted; the next
    /// `get_key` call refetches fresh material.
    async fn rotate_check(&self) -> bool;
}

/// Named interface to a remote key-management service.
///
/// An implementation either vends data keys (`generate_data_key`) or signs
/// remotely (`sign`/`verify`); `supports_data_keys` selects the mode.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// True when the service vends plaintext data keys; false when all
    /// signing happens remotely.
    fn supports_data_keys(&self) -> bool;

    /// Requests a plaintext data key for the given key ID.
    async fn generate_data_key(&self, key_id: &str) -> Result<Vec<u8>, PipelineError>;

    /// Signs data remotely under the given key ID.
    async fn sign(&self, key_id: &str, data: &[u8]) -> Result<Vec<u8>, PipelineError>;

    /// Verifies a signature remotely under the given key ID.
    async fn verify(
        &self,
        key_id: &str,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, PipelineError>;
}
