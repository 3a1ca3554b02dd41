// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in filters: level gate, probabilistic sampling, token-bucket rate
//! limiting, and adaptive sampling.

pub mod adaptive_sampling;
pub mod level;
pub mod rate_limit;
pub mod sampling;

pub use adaptive_sampling::{AdaptiveSamplingConfig, AdaptiveSamplingFilter};
pub use level::{LevelFilter, LevelFilterConfig};
pub use rate_limit::{RateLimitFilter, RateLimitFilterConfig};
pub use sampling::{SamplingFilter, SamplingFilterConfig};
