// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Provides standardized Unix exit codes following BSD `sysexits.h`
//! conventions for processes embedding the logging pipeline.
//!
//! ## Exit Code Conventions
//!
//! - **0**: Success
//! - **1**: General error
//! - **64-78**: Specific error conditions (BSD sysexits.h)
//! - **128+N**: Fatal signal N (e.g., 130 = SIGINT) - produced by the
//!   drain-then-reraise signal path, not constructed here

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64)
    UsageError = 64,

    /// Data format error (65)
    /// - Malformed configuration
    DataError = 65,

    /// Cannot open input (66)
    NoInput = 66,

    /// Internal software error (70)
    Software = 70,

    /// Cannot create output file (73)
    CantCreate = 73,

    /// I/O error (74)
    IoError = 74,
}

impl ExitCode {
    /// Returns the raw process exit status.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Conventional exit status for death by signal N.
    pub fn from_signal(signum: i32) -> i32 {
        128 + signum
    }

    /// Maps a boxed error to a best-fit exit code by inspecting well-known
    /// error types.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::NotFound => Self::NoInput,
                std::io::ErrorKind::PermissionDenied => Self::CantCreate,
                _ => Self::IoError,
            };
        }
        Self::Error
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_i32(), match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::UsageError => "usage error",
            Self::DataError => "data error",
            Self::NoInput => "no input",
            Self::Software => "software error",
            Self::CantCreate => "cannot create output",
            Self::IoError => "io error",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Error.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::IoError.as_i32(), 74);
    }

    #[test]
    fn test_signal_exit_status() {
        assert_eq!(ExitCode::from_signal(2), 130); // SIGINT
        assert_eq!(ExitCode::from_signal(15), 143); // SIGTERM
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(ExitCode::from_error(&err), ExitCode::NoInput);
    }
}
