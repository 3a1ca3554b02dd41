// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tamper-evidence subsystem: per-event sealing (integrity enricher), chain
//! state persistence, key providers, and the sealed sink wrapper with
//! signed manifests.

pub mod chain_state;
pub mod enricher;
pub mod providers;
pub mod sealed_sink;

pub use chain_state::{ChainState, ChainStatePersistence};
pub use enricher::IntegrityEnricher;
pub use providers::{decode_key, EnvKeyProvider, FileKeyProvider, KmsKeyProvider};
pub use sealed_sink::{canonical_manifest_payload, FileMetadata, ManifestSigner, SealedSink};
