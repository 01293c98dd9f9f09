//! Chunklist format error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatError {
    #[error("chunklist header too short: {len} bytes")]
    HeaderTooShort { len: usize },

    #[error("wrong magic {found:02x?}")]
    BadMagic { found: [u8; 4] },

    #[error("unexpected {field}: {value}")]
    UnexpectedHeaderField { field: String, value: u64 },

    #[error("unsupported signature method {0}")]
    UnsupportedSignatureMethod(u8),

    #[error("chunk count must be positive")]
    EmptyChunkTable,

    #[error("signature offset {declared} does not match {expected} for the declared chunk count")]
    SignatureOffsetMismatch { declared: u64, expected: u64 },

    #[error("chunklist truncated: header declares {declared} bytes, got {actual}")]
    Truncated { declared: u64, actual: u64 },

    #[error("{count} bytes of trailing data after signature")]
    TrailingData { count: u64 },

    #[error("chunk {index} has zero length")]
    ZeroLengthChunk { index: usize },

    #[error("chunk {index} at offset {offset} does not follow previous chunk ending at {expected}")]
    NonContiguous {
        index: usize,
        offset: u64,
        expected: u64,
    },

    #[error("chunk offsets overflow at chunk {index}")]
    OffsetOverflow { index: usize },

    #[error("chunk lengths sum to {actual} bytes but the payload is {declared} bytes")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("offset {offset} is not on a chunk boundary")]
    UnalignedOffset { offset: u64 },
}
