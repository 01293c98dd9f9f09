//! Signature and payload verification

use std::path::Path;

use macfetch_errors::{Error, FormatError, IntegrityError, SigningError};
use macfetch_events::{AppEvent, EventEmitter, FailureContext, VerificationEvent};
use macfetch_hash::Hasher;
use macfetch_signing::{verify_digest_with_keys, TrustedKey};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::format::SignatureMethod;
use crate::parser::{ChunkDescriptor, Chunklist};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Check the chunklist's signature block against the trusted keys.
/// Returns the id of the key that verified it.
///
/// # Errors
/// Returns `SigningError::NoTrustedKeys` for a signed chunklist and an empty
/// key set, `SigningError::MissingSignature` for a digest-only chunklist whose
/// digest matches, and `SigningError::VerificationFailed` otherwise.
pub fn verify_signature(chunklist: &Chunklist, trusted_keys: &[TrustedKey]) -> Result<String, Error> {
    let digest = chunklist.signed_digest();
    match chunklist.signature_method() {
        SignatureMethod::Rsa2048Sha256 => {
            if trusted_keys.is_empty() {
                return Err(SigningError::NoTrustedKeys.into());
            }
            verify_digest_with_keys(&digest, chunklist.signature_block(), trusted_keys)
        }
        SignatureMethod::Sha256Digest => {
            if chunklist.signature_block() == digest.as_bytes() {
                Err(SigningError::MissingSignature.into())
            } else {
                Err(SigningError::VerificationFailed {
                    reason: "embedded digest does not match the chunk table".to_string(),
                }
                .into())
            }
        }
    }
}

/// Signature check with the unsigned opt-in applied.
///
/// A digest-only chunklist whose digest matches is accepted as `None` when
/// `allow_unsigned` is set; a signed one yields the verifying key id.
///
/// # Errors
/// Returns the `SigningError` from [`verify_signature`] otherwise.
pub fn accept_signature(
    chunklist: &Chunklist,
    trusted_keys: &[TrustedKey],
    allow_unsigned: bool,
) -> Result<Option<String>, Error> {
    match verify_signature(chunklist, trusted_keys) {
        Ok(key_id) => Ok(Some(key_id)),
        Err(Error::Signing(SigningError::MissingSignature)) if allow_unsigned => {
            tracing::warn!(target: "macfetch::chunklist", "accepting unsigned chunklist");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// [`accept_signature`] for a downloaded chunklist, reporting the result
/// for `path` through `emitter`
///
/// # Errors
/// Returns the signature failure after emitting `VerificationEvent::Failed`.
pub fn check_signature<E>(
    chunklist: &Chunklist,
    path: &Path,
    trusted_keys: &[TrustedKey],
    allow_unsigned: bool,
    emitter: &E,
) -> Result<Option<String>, Error>
where
    E: EventEmitter + ?Sized,
{
    match accept_signature(chunklist, trusted_keys, allow_unsigned) {
        Ok(key_id) => {
            emitter.emit(AppEvent::Verification(VerificationEvent::SignatureVerified {
                key_id: key_id.clone(),
                chunk_count: chunklist.chunks().len(),
            }));
            Ok(key_id)
        }
        Err(e) => {
            emitter.emit(AppEvent::Verification(VerificationEvent::Failed {
                path: path.display().to_string(),
                failure: FailureContext::from_error(&e),
            }));
            Err(e)
        }
    }
}

/// Outcome of a full payload check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Chunks hashed during this pass, excluding any already-verified prefix
    pub chunks_verified: usize,
    /// Bytes hashed during this pass
    pub bytes_verified: u64,
}

/// Outcome of checking a partially downloaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrefixReport {
    /// Length of the verified prefix, always on a chunk boundary
    pub verified_len: u64,
    pub chunks_verified: usize,
}

/// Incremental chunk checker fed with payload bytes as they arrive
#[derive(Debug)]
pub struct ChunkVerifier<'a> {
    chunks: &'a [ChunkDescriptor],
    index: usize,
    first_index: usize,
    filled: u64,
    position: u64,
    start: u64,
    hasher: Hasher,
}

impl<'a> ChunkVerifier<'a> {
    /// Start checking at `start_offset`, which must be a chunk boundary.
    ///
    /// # Errors
    /// Returns `FormatError::UnalignedOffset` if `start_offset` falls inside a chunk.
    pub fn new(chunklist: &'a Chunklist, start_offset: u64) -> Result<Self, Error> {
        let index = chunklist
            .boundary_index(start_offset)
            .ok_or(FormatError::UnalignedOffset {
                offset: start_offset,
            })?;
        Ok(Self {
            chunks: chunklist.chunks(),
            index,
            first_index: index,
            filled: 0,
            position: start_offset,
            start: start_offset,
            hasher: Hasher::default(),
        })
    }

    /// Feed the next bytes of the payload.
    ///
    /// # Errors
    /// Returns `IntegrityError::ChunkMismatch` as soon as a completed chunk
    /// hashes wrong, or `IntegrityError::TrailingData` for bytes past the last chunk.
    pub fn update(&mut self, mut data: &[u8]) -> Result<(), Error> {
        while !data.is_empty() {
            let Some(chunk) = self.chunks.get(self.index) else {
                return Err(IntegrityError::TrailingData {
                    offset: self.position,
                }
                .into());
            };

            let remaining = u64::from(chunk.length) - self.filled;
            #[allow(clippy::cast_possible_truncation)]
            let take = remaining.min(data.len() as u64) as usize;
            self.hasher.update(&data[..take]);
            self.filled += take as u64;
            self.position += take as u64;
            data = &data[take..];

            if self.filled == u64::from(chunk.length) {
                if self.hasher.finalize_reset() != chunk.hash {
                    return Err(IntegrityError::ChunkMismatch {
                        chunk_index: self.index,
                        offset: chunk.offset,
                    }
                    .into());
                }
                self.index += 1;
                self.filled = 0;
            }
        }
        Ok(())
    }

    /// Payload offset of the next byte expected
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// End of the last fully verified chunk
    #[must_use]
    pub fn verified_len(&self) -> u64 {
        self.position - self.filled
    }

    /// Whether every chunk has been seen
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.index == self.chunks.len()
    }

    /// Finish a full pass.
    ///
    /// # Errors
    /// Returns `IntegrityError::Truncated` naming the first incomplete chunk
    /// if the payload ended early.
    pub fn finish(self) -> Result<VerifyReport, Error> {
        if let Some(chunk) = self.chunks.get(self.index) {
            return Err(IntegrityError::Truncated {
                chunk_index: self.index,
                offset: chunk.offset,
            }
            .into());
        }
        Ok(VerifyReport {
            chunks_verified: self.index - self.first_index,
            bytes_verified: self.position - self.start,
        })
    }
}

/// Stream a payload through the chunk table.
///
/// `reader` yields the payload starting at `verified_prefix_len`, which must
/// be a chunk boundary already checked by the caller.
///
/// # Errors
/// Returns the first `IntegrityError` found, `FormatError::UnalignedOffset`
/// for a prefix inside a chunk, `Error::Cancelled` when `cancel` fires, or an
/// I/O error from the reader.
pub async fn verify_payload<R>(
    chunklist: &Chunklist,
    mut reader: R,
    verified_prefix_len: u64,
    cancel: &CancellationToken,
) -> Result<VerifyReport, Error>
where
    R: AsyncRead + Unpin,
{
    let mut verifier = ChunkVerifier::new(chunklist, verified_prefix_len)?;
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        verifier.update(&buffer[..n])?;
    }

    verifier.finish()
}

/// Check the chunks that lie entirely within the first `available_len`
/// bytes of a partial payload. Chunks beyond are not read.
///
/// # Errors
/// Returns the first `IntegrityError` in the prefix, `IntegrityError::Truncated`
/// if the reader holds fewer than the covered bytes, or `Error::Cancelled`.
pub async fn verify_prefix<R>(
    chunklist: &Chunklist,
    reader: R,
    available_len: u64,
    cancel: &CancellationToken,
) -> Result<PrefixReport, Error>
where
    R: AsyncRead + Unpin,
{
    let covered = chunklist
        .chunks()
        .iter()
        .take_while(|chunk| chunk.end() <= available_len)
        .last()
        .map_or(0, ChunkDescriptor::end);

    let mut reader = reader.take(covered);
    let mut verifier = ChunkVerifier::new(chunklist, 0)?;
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    while verifier.position() < covered {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        verifier.update(&buffer[..n])?;
    }

    if verifier.verified_len() < covered {
        let chunk_index = chunklist
            .boundary_index(verifier.verified_len())
            .unwrap_or_default();
        return Err(IntegrityError::Truncated {
            chunk_index,
            offset: verifier.verified_len(),
        }
        .into());
    }

    Ok(PrefixReport {
        verified_len: covered,
        chunks_verified: chunklist.boundary_index(covered).unwrap_or_default(),
    })
}

/// Result of an offline file check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Key that verified the signature; `None` for an accepted unsigned chunklist
    pub key_id: Option<String>,
    pub chunks_verified: usize,
    pub bytes_verified: u64,
}

/// Verify a complete file: signature first, then every chunk.
///
/// With `allow_unsigned`, a digest-only chunklist whose digest matches is
/// accepted without a key.
///
/// # Errors
/// Returns the signature error before any payload byte is read, then any
/// integrity, I/O or cancellation error.
pub async fn verify_file(
    chunklist: &Chunklist,
    payload: &Path,
    trusted_keys: &[TrustedKey],
    allow_unsigned: bool,
    cancel: &CancellationToken,
) -> Result<FileReport, Error> {
    let key_id = accept_signature(chunklist, trusted_keys, allow_unsigned)?;

    let file = tokio::fs::File::open(payload)
        .await
        .map_err(|e| Error::io_with_path(&e, payload))?;
    let report = verify_payload(chunklist, tokio::io::BufReader::new(file), 0, cancel).await?;

    tracing::debug!(
        path = %payload.display(),
        chunks = report.chunks_verified,
        "payload verified"
    );

    Ok(FileReport {
        key_id,
        chunks_verified: report.chunks_verified,
        bytes_verified: report.bytes_verified,
    })
}
