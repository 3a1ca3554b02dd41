// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services and infrastructure ports for the logging pipeline.

pub mod canonical;
pub mod key_provider;
pub mod sink;
pub mod stage;

pub use canonical::{
    b64url_decode, b64url_encode, canonical_event_bytes, canonicalize, chain_hash, timestamp_str,
    SerializedView, GENESIS_HASH,
};
pub use key_provider::{KeyProvider, KmsClient, KEY_LENGTH};
pub use sink::{Sink, SinkCapabilities};
pub use stage::{AdaptiveSamplingSpec, Enricher, Filter, Processor, Redactor};
