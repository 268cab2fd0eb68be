//! Error types for the pehdr crate.

use thiserror::Error;

/// Reasons a block offset is rejected as a PE header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeError {
    #[error("Offset {offset:#x} is outside of a {len:#x} byte block")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Missing MZ magic")]
    BadDosMagic,

    #[error("e_lfanew {0:#x} outside of accepted range")]
    BadLfanew(u32),

    #[error("Header truncated: need {needed:#x} bytes, block has {available:#x}")]
    Truncated { needed: usize, available: usize },

    #[error("Missing PE signature")]
    BadPeSignature,

    #[error("Implausible section count: {0}")]
    BadSectionCount(u16),

    #[error("Unknown optional header magic: {0:#x}")]
    BadOptionalMagic(u16),

    #[error("Optional header too small: {0:#x}")]
    BadOptionalSize(u16),

    #[error("SizeOfImage is zero")]
    EmptyImage,
}

pub type PeResult<T> = Result<T, PeError>;
