// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Built-in redactors: field masking by dot-path and regex masking of
//! string values.

pub mod field_mask;
pub mod regex_mask;

pub use field_mask::{FieldMaskConfig, FieldMaskRedactor};
pub use regex_mask::{RegexMaskConfig, RegexMaskRedactor};
