//! Binary layout of the chunklist header
//!
//! All integers are little endian:
//!
//! ```text
//! 0x00  magic "CNKL"
//! 0x04  u32 header size (0x24)
//! 0x08  u8  file version (1)
//! 0x09  u8  chunk method (1 = SHA-256)
//! 0x0A  u8  signature method (1 = RSA-2048, 2 = bare SHA-256)
//! 0x0B  u8  padding
//! 0x0C  u64 chunk count
//! 0x14  u64 chunk table offset (0x24)
//! 0x1C  u64 signature offset
//! ```

use macfetch_errors::{Error, FormatError};
use macfetch_hash::DIGEST_LEN;
use serde::{Deserialize, Serialize};

pub const MAGIC: [u8; 4] = *b"CNKL";
pub const HEADER_SIZE: usize = 0x24;
pub const FILE_VERSION: u8 = 1;
pub const CHUNK_METHOD_SHA256: u8 = 1;
/// One table entry: `u32` length followed by the digest
pub const ENTRY_SIZE: usize = 4 + DIGEST_LEN;

/// How the signed region is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMethod {
    /// RSA-2048 PKCS#1 v1.5 over SHA-256, 256-byte block
    Rsa2048Sha256,
    /// Bare SHA-256 of the signed region, 32-byte block
    Sha256Digest,
}

impl SignatureMethod {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Rsa2048Sha256 => 1,
            Self::Sha256Digest => 2,
        }
    }

    /// Size of the block trailing the chunk table
    #[must_use]
    pub fn block_len(self) -> usize {
        match self {
            Self::Rsa2048Sha256 => macfetch_signing::SIGNATURE_LEN,
            Self::Sha256Digest => DIGEST_LEN,
        }
    }

    /// # Errors
    /// Returns an error for any code other than 1 or 2.
    pub fn from_code(code: u8) -> Result<Self, Error> {
        match code {
            1 => Ok(Self::Rsa2048Sha256),
            2 => Ok(Self::Sha256Digest),
            other => Err(FormatError::UnsupportedSignatureMethod(other).into()),
        }
    }
}

/// Decoded chunklist header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub signature_method: SignatureMethod,
    pub chunk_count: u64,
    pub signature_offset: u64,
}

impl Header {
    #[must_use]
    pub fn new(signature_method: SignatureMethod, chunk_count: u64) -> Self {
        Self {
            signature_method,
            chunk_count,
            signature_offset: HEADER_SIZE as u64 + ENTRY_SIZE as u64 * chunk_count,
        }
    }

    /// Decode and validate the fixed header fields
    ///
    /// # Errors
    /// Returns a `FormatError` when any fixed field differs from the supported layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::HeaderTooShort { len: bytes.len() }.into());
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic }.into());
        }

        let header_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        expect_field("header size", u64::from(header_size), HEADER_SIZE as u64)?;
        expect_field("file version", u64::from(bytes[8]), u64::from(FILE_VERSION))?;
        expect_field(
            "chunk method",
            u64::from(bytes[9]),
            u64::from(CHUNK_METHOD_SHA256),
        )?;
        let signature_method = SignatureMethod::from_code(bytes[10])?;

        let chunk_count = read_u64(bytes, 0x0C);
        let chunk_offset = read_u64(bytes, 0x14);
        let signature_offset = read_u64(bytes, 0x1C);

        if chunk_count == 0 {
            return Err(FormatError::EmptyChunkTable.into());
        }
        expect_field("chunk table offset", chunk_offset, HEADER_SIZE as u64)?;

        let expected = (ENTRY_SIZE as u64)
            .checked_mul(chunk_count)
            .and_then(|table| table.checked_add(HEADER_SIZE as u64));
        if expected != Some(signature_offset) {
            return Err(FormatError::SignatureOffsetMismatch {
                declared: signature_offset,
                expected: expected.unwrap_or(u64::MAX),
            }
            .into());
        }

        Ok(Self {
            signature_method,
            chunk_count,
            signature_offset,
        })
    }

    /// Total file size the header declares
    #[must_use]
    pub fn declared_len(&self) -> u64 {
        self.signature_offset
            .saturating_add(self.signature_method.block_len() as u64)
    }

    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        #[allow(clippy::cast_possible_truncation)]
        out[4..8].copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        out[8] = FILE_VERSION;
        out[9] = CHUNK_METHOD_SHA256;
        out[10] = self.signature_method.code();
        out[0x0C..0x14].copy_from_slice(&self.chunk_count.to_le_bytes());
        out[0x14..0x1C].copy_from_slice(&(HEADER_SIZE as u64).to_le_bytes());
        out[0x1C..0x24].copy_from_slice(&self.signature_offset.to_le_bytes());
        out
    }
}

fn expect_field(field: &str, value: u64, expected: u64) -> Result<(), Error> {
    if value == expected {
        Ok(())
    } else {
        Err(FormatError::UnexpectedHeaderField {
            field: field.to_string(),
            value,
        }
        .into())
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
