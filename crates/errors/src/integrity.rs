//! Payload integrity error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntegrityError {
    #[error("chunk {chunk_index} at offset {offset} does not match its digest")]
    ChunkMismatch { chunk_index: usize, offset: u64 },

    #[error("payload ends inside chunk {chunk_index} at offset {offset}")]
    Truncated { chunk_index: usize, offset: u64 },

    #[error("payload has trailing data at offset {offset}")]
    TrailingData { offset: u64 },
}

impl IntegrityError {
    /// Index of the offending chunk, when the failure is tied to one
    #[must_use]
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::ChunkMismatch { chunk_index, .. } | Self::Truncated { chunk_index, .. } => {
                Some(*chunk_index)
            }
            Self::TrailingData { .. } => None,
        }
    }

    /// Payload offset where the failure was detected
    #[must_use]
    pub fn offset(&self) -> u64 {
        match self {
            Self::ChunkMismatch { offset, .. }
            | Self::Truncated { offset, .. }
            | Self::TrailingData { offset } => *offset,
        }
    }
}
