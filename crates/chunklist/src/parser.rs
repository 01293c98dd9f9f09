//! Chunklist decoding and validation

use std::path::Path;

use macfetch_errors::{Error, FormatError};
use macfetch_hash::{Hash, DIGEST_LEN};
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::format::{Header, SignatureMethod, ENTRY_SIZE, HEADER_SIZE};

/// Upper bound on a chunklist file; real manifests are well under a megabyte
pub const MAX_CHUNKLIST_SIZE: u64 = 16 * 1024 * 1024;

/// One window of the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    /// Byte offset of the window, derived as the sum of previous lengths
    pub offset: u64,
    pub length: u32,
    pub hash: Hash,
}

impl ChunkDescriptor {
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

/// A decoded, structurally valid chunklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunklist {
    header: Header,
    signed_region: Vec<u8>,
    signature: Vec<u8>,
    chunks: Vec<ChunkDescriptor>,
}

/// Decode a chunklist
///
/// # Errors
/// Returns a `FormatError` if the header, chunk table or signature block is malformed,
/// or if there are bytes after the signature block.
pub fn parse(bytes: &[u8]) -> Result<Chunklist, Error> {
    let header = Header::decode(bytes)?;

    let declared = header.declared_len();
    let actual = bytes.len() as u64;
    if actual < declared {
        return Err(FormatError::Truncated { declared, actual }.into());
    }
    if actual > declared {
        return Err(FormatError::TrailingData {
            count: actual - declared,
        }
        .into());
    }

    // declared == bytes.len(), so both offsets fit in usize
    #[allow(clippy::cast_possible_truncation)]
    let signature_offset = header.signature_offset as usize;
    let table = &bytes[HEADER_SIZE..signature_offset];

    let mut chunks = Vec::with_capacity(table.len() / ENTRY_SIZE);
    let mut offset = 0u64;
    for (index, entry) in table.chunks_exact(ENTRY_SIZE).enumerate() {
        let length = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
        if length == 0 {
            return Err(FormatError::ZeroLengthChunk { index }.into());
        }
        let hash = Hash::from_slice(&entry[4..4 + DIGEST_LEN])
            .ok_or(FormatError::Truncated { declared, actual })?;
        chunks.push(ChunkDescriptor {
            offset,
            length,
            hash,
        });
        offset = offset
            .checked_add(u64::from(length))
            .ok_or(FormatError::OffsetOverflow { index })?;
    }

    Ok(Chunklist {
        header,
        signed_region: bytes[..signature_offset].to_vec(),
        signature: bytes[signature_offset..].to_vec(),
        chunks,
    })
}

/// Decode a chunklist that must describe a payload of exactly `payload_len` bytes
///
/// # Errors
/// Returns a `FormatError` if decoding fails or the chunk lengths do not sum to `payload_len`.
pub fn parse_for_payload(bytes: &[u8], payload_len: u64) -> Result<Chunklist, Error> {
    let chunklist = parse(bytes)?;
    chunklist.expect_total_size(payload_len)?;
    Ok(chunklist)
}

impl Chunklist {
    /// Assemble a chunklist from descriptors and a signature block
    ///
    /// The descriptors must start at zero, be gapless and non-empty; when
    /// `declared_total` is given the lengths must sum to it. The signature
    /// method follows from the block size.
    ///
    /// # Errors
    /// Returns a `FormatError` when any of those checks fail.
    pub fn from_parts(
        chunks: Vec<ChunkDescriptor>,
        signature: Vec<u8>,
        declared_total: Option<u64>,
    ) -> Result<Self, Error> {
        if chunks.is_empty() {
            return Err(FormatError::EmptyChunkTable.into());
        }

        let mut expected = 0u64;
        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.length == 0 {
                return Err(FormatError::ZeroLengthChunk { index }.into());
            }
            if chunk.offset != expected {
                return Err(FormatError::NonContiguous {
                    index,
                    offset: chunk.offset,
                    expected,
                }
                .into());
            }
            expected = expected
                .checked_add(u64::from(chunk.length))
                .ok_or(FormatError::OffsetOverflow { index })?;
        }

        let signature_method = if signature.len() == SignatureMethod::Rsa2048Sha256.block_len() {
            SignatureMethod::Rsa2048Sha256
        } else if signature.len() == SignatureMethod::Sha256Digest.block_len() {
            SignatureMethod::Sha256Digest
        } else {
            return Err(FormatError::UnexpectedHeaderField {
                field: "signature block length".to_string(),
                value: signature.len() as u64,
            }
            .into());
        };

        let header = Header::new(signature_method, chunks.len() as u64);
        let mut signed_region = Vec::with_capacity(HEADER_SIZE + chunks.len() * ENTRY_SIZE);
        signed_region.extend_from_slice(&header.encode());
        for chunk in &chunks {
            signed_region.extend_from_slice(&chunk.length.to_le_bytes());
            signed_region.extend_from_slice(chunk.hash.as_bytes());
        }

        let chunklist = Self {
            header,
            signed_region,
            signature,
            chunks,
        };
        if let Some(total) = declared_total {
            chunklist.expect_total_size(total)?;
        }
        Ok(chunklist)
    }

    /// Read and decode a chunklist file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, exceeds [`MAX_CHUNKLIST_SIZE`],
    /// or is malformed.
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        let mut bytes = Vec::new();
        file.take(MAX_CHUNKLIST_SIZE + 1)
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        if bytes.len() as u64 > MAX_CHUNKLIST_SIZE {
            return Err(FormatError::TrailingData {
                count: bytes.len() as u64 - MAX_CHUNKLIST_SIZE,
            }
            .into());
        }
        parse(&bytes)
    }

    fn expect_total_size(&self, declared: u64) -> Result<(), Error> {
        let actual = self.total_size();
        if actual == declared {
            Ok(())
        } else {
            Err(FormatError::SizeMismatch { declared, actual }.into())
        }
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    #[must_use]
    pub fn signature_method(&self) -> SignatureMethod {
        self.header.signature_method
    }

    /// Header plus chunk table, the bytes covered by the signature
    #[must_use]
    pub fn signed_region(&self) -> &[u8] {
        &self.signed_region
    }

    #[must_use]
    pub fn signed_digest(&self) -> Hash {
        Hash::from_data(&self.signed_region)
    }

    /// Raw signature block as stored in the file
    #[must_use]
    pub fn signature_block(&self) -> &[u8] {
        &self.signature
    }

    /// Sum of all chunk lengths
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.chunks.last().map_or(0, ChunkDescriptor::end)
    }

    /// Index of the chunk starting at `offset`, or the chunk count when
    /// `offset` is the end of the payload
    #[must_use]
    pub fn boundary_index(&self, offset: u64) -> Option<usize> {
        if offset == self.total_size() {
            return Some(self.chunks.len());
        }
        self.chunks
            .binary_search_by_key(&offset, |chunk| chunk.offset)
            .ok()
    }

    /// Encode back into the wire format
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.signed_region.len() + self.signature.len());
        out.extend_from_slice(&self.signed_region);
        out.extend_from_slice(&self.signature);
        out
    }
}
