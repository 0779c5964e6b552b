// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fatal error taxonomy for the behavior model.
//!
//! Every invariant violation inside the model is a hard stop. Functions
//! return [`GpuResult`] so the failure travels with `?` to the top-level
//! transaction loop, which reports it and terminates.

use thiserror::Error;

/// Memory space an access was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySpaceKind {
    Gpu,
    System,
    Unknown,
}

impl std::fmt::Display for MemorySpaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::System => write!(f, "system"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FatalError {
    /// A register value outside the domain the hardware accepts.
    #[error("{what}: value {value} out of range")]
    Domain { what: &'static str, value: String },

    /// An enum-valued register or field carried an unknown value.
    #[error("{what}: unsupported value {value}")]
    UnsupportedEnum { what: &'static str, value: u32 },

    /// Access beyond the configured size of a memory space.
    #[error("address 0x{address:08X} (+{size} bytes) overflows {space} memory")]
    AddressOverflow {
        address: u64,
        size: usize,
        space: MemorySpaceKind,
    },

    /// Deliberately unimplemented path (distinct from "should never happen").
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The shader program is malformed (bad opcode/bank, fetch past end).
    #[error("malformed shader program at pc {pc}: {reason}")]
    MalformedProgram { pc: u32, reason: String },

    /// The MetaStream trace is malformed or truncated.
    #[error("malformed trace: {0}")]
    MalformedTrace(String),

    /// Generic internal invariant violation.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Image(String),
}

impl FatalError {
    /// Shorthand for an out-of-range register value.
    pub fn domain(what: &'static str, value: impl std::fmt::Display) -> Self {
        Self::Domain {
            what,
            value: value.to_string(),
        }
    }

    /// Shorthand for an unknown enum value.
    pub fn unsupported(what: &'static str, value: u32) -> Self {
        Self::UnsupportedEnum { what, value }
    }
}

pub type GpuResult<T> = Result<T, FatalError>;
