// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Canonical Serialization Service
//!
//! Deterministic JSON bytes for signing, base64url helpers, and the chain
//! hash construction used by the tamper-evidence subsystem.
//!
//! ## Canonical JSON
//!
//! - Object keys sorted lexicographically at every nesting level
//! - Compact separators (`,` and `:`), no whitespace
//! - UTF-8 output, non-ASCII characters emitted verbatim (no `\uXXXX`
//!   escaping beyond what JSON requires)
//! - The `integrity` metadata block is excluded when producing MAC input so
//!   a sealed event canonicalizes to the same bytes it was signed over
//!
//! ## Chain Hash
//!
//! ```text
//! chain_hash = SHA-256(prev_chain_hash || mac || be_u64(seq) || utf8(ts_str))
//! ```
//!
//! with `chain_hash_0` equal to 32 zero bytes (the genesis hash). `ts_str`
//! is the decimal rendering of the envelope's float timestamp (always with
//! a fractional part, e.g. `1704067200.0`).

use crate::entities::log_event::{LogEvent, INTEGRITY_KEY};
use crate::error::PipelineError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Genesis chain hash: 32 zero bytes.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// A lightweight container exposing serialized envelope bytes.
///
/// Writers borrow the bytes; the container owns them for the lifetime of a
/// single sink emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedView {
    data: Vec<u8>,
}

impl SerializedView {
    /// Wraps owned serialized bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Borrows the serialized bytes for zero-copy I/O.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the view holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the view, returning the owned bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for SerializedView {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Produces canonical JSON bytes for an arbitrary value tree.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, PipelineError> {
    let mut out = Vec::with_capacity(128);
    write_canonical(&mut out, value)?;
    Ok(out)
}

/// Produces the MAC input for an event: canonical JSON of the envelope with
/// the `integrity` metadata block removed.
pub fn canonical_event_bytes(event: &LogEvent) -> Result<Vec<u8>, PipelineError> {
    let mut value = event.to_value();
    if let Some(metadata) = value
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
    {
        metadata.remove(INTEGRITY_KEY);
    }
    canonicalize(&value)
}

fn write_canonical(out: &mut Vec<u8>, value: &Value) -> Result<(), PipelineError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)
                    .map_err(|e| PipelineError::serialization_error(e.to_string()))?;
                out.push(b':');
                write_canonical(out, &map[key.as_str()])?;
            }
            out.push(b'}');
            Ok(())
        }
        Value::Array(items) => {
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_canonical(out, item)?;
            }
            out.push(b']');
            Ok(())
        }
        scalar => serde_json::to_writer(out, scalar)
            .map_err(|e| PipelineError::serialization_error(e.to_string())),
    }
}

/// Encodes bytes as RFC 4648 base64url without padding.
pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes an RFC 4648 base64url string (padding not required).
pub fn b64url_decode(s: &str) -> Result<Vec<u8>, PipelineError> {
    URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|e| PipelineError::serialization_error(format!("invalid base64url: {}", e)))
}

/// Renders the envelope timestamp for chain-hash input.
///
/// Always carries a fractional part (`1704067200.0`) so the rendering is
/// unambiguous and stable for whole-second timestamps.
pub fn timestamp_str(timestamp: f64) -> String {
    format!("{:?}", timestamp)
}

/// Computes the chain hash linking a sealed event to its predecessor.
pub fn chain_hash(prev_chain_hash: &[u8; 32], mac: &[u8], seq: u64, ts_str: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_chain_hash);
    hasher.update(mac);
    hasher.update(seq.to_be_bytes());
    hasher.update(ts_str.as_bytes());
    hasher.finalize().into()
}
