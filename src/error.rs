use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong while decoding an $MFT entry.
///
/// Only a failure of the fixed entry header is fatal for a record; every other
/// variant is contained at the attribute boundary and surfaces as a
/// [`Diagnostic`](crate::diagnostics::Diagnostic).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },

    #[error("offset {offset} is outside a buffer of {len} bytes")]
    OutOfBounds { offset: u64, len: usize },

    #[error("malformed UTF-16 at offset {offset}")]
    InvalidEncoding { offset: u64 },

    #[error("FILETIME {0:#x} is outside the representable date range")]
    TimestampOutOfRange(u64),

    #[error("unknown attribute type {0:#x}")]
    UnknownAttributeType(u32),

    #[error("structural corruption: {0}")]
    StructuralCorruption(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Io(e.to_string())
    }
}

impl DecodeError {
    /// `UnknownAttributeType` is a normal skip, everything else is a real problem.
    pub fn is_error(&self) -> bool {
        !matches!(self, DecodeError::UnknownAttributeType(_))
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
