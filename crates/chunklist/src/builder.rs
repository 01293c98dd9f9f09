//! Produce chunklists for a payload
//!
//! Signing is delegated to a closure so that private keys never pass
//! through this crate.

use macfetch_errors::{Error, FormatError};
use macfetch_hash::Hash;

use crate::format::SignatureMethod;
use crate::parser::{ChunkDescriptor, Chunklist};

/// Window size used by the vendor's own manifests
pub const DEFAULT_CHUNK_SIZE: u32 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ChunklistBuilder {
    chunk_size: u32,
}

impl Default for ChunklistBuilder {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunklistBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the window size; the last window may be shorter
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn descriptors(&self, payload: &[u8]) -> Result<Vec<ChunkDescriptor>, Error> {
        if payload.is_empty() {
            return Err(FormatError::EmptyChunkTable.into());
        }
        let mut offset = 0u64;
        Ok(payload
            .chunks(self.chunk_size as usize)
            .map(|window| {
                #[allow(clippy::cast_possible_truncation)]
                let length = window.len() as u32;
                let descriptor = ChunkDescriptor {
                    offset,
                    length,
                    hash: Hash::from_data(window),
                };
                offset += u64::from(length);
                descriptor
            })
            .collect())
    }

    /// Build an RSA-signed chunklist.
    ///
    /// `signer` receives the SHA-256 of the signed region and returns the
    /// 256-byte signature block in on-disk (little-endian) order.
    ///
    /// # Errors
    /// Returns an error for an empty payload, a failing signer, or a block of the wrong size.
    pub fn build_signed<F>(&self, payload: &[u8], signer: F) -> Result<Chunklist, Error>
    where
        F: FnOnce(&Hash) -> Result<Vec<u8>, Error>,
    {
        let chunks = self.descriptors(payload)?;
        // The signed region depends only on the descriptors and method.
        let placeholder = vec![0u8; SignatureMethod::Rsa2048Sha256.block_len()];
        let unsigned = Chunklist::from_parts(chunks.clone(), placeholder, Some(payload.len() as u64))?;
        let signature = signer(&unsigned.signed_digest())?;
        Chunklist::from_parts(chunks, signature, Some(payload.len() as u64)).and_then(|c| {
            if c.signature_method() == SignatureMethod::Rsa2048Sha256 {
                Ok(c)
            } else {
                Err(FormatError::UnexpectedHeaderField {
                    field: "signature block length".to_string(),
                    value: c.signature_block().len() as u64,
                }
                .into())
            }
        })
    }

    /// Build a digest-only chunklist (signature method 2)
    ///
    /// # Errors
    /// Returns an error for an empty payload.
    pub fn build_unsigned(&self, payload: &[u8]) -> Result<Chunklist, Error> {
        let chunks = self.descriptors(payload)?;
        let placeholder = vec![0u8; SignatureMethod::Sha256Digest.block_len()];
        let unsigned = Chunklist::from_parts(chunks.clone(), placeholder, Some(payload.len() as u64))?;
        let digest = unsigned.signed_digest();
        Chunklist::from_parts(chunks, digest.as_bytes().to_vec(), Some(payload.len() as u64))
    }
}
