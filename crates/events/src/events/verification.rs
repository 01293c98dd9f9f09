use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Chunklist signature and payload checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationEvent {
    /// The chunklist signature checked out against a trusted key
    SignatureVerified {
        key_id: Option<String>,
        chunk_count: usize,
    },

    /// Chunks of an existing partial file were checked before resuming
    PrefixVerified {
        verified_len: u64,
        chunks_verified: usize,
    },

    ChunkVerified {
        chunk_index: usize,
        offset: u64,
    },

    PayloadVerified {
        path: String,
        bytes: u64,
        chunks: usize,
    },

    Failed {
        path: String,
        failure: FailureContext,
    },
}
