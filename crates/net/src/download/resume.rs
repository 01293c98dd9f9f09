//! Inspection of partial destination files before resuming

use macfetch_chunklist::{verify_prefix, Chunklist};
use macfetch_errors::Error;
use std::path::Path;
use tokio::fs::{self as tokio_fs, OpenOptions};
use tokio_util::sync::CancellationToken;

/// What was found at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) struct PartialCheck {
    /// Bytes present before inspection
    pub on_disk: u64,
    /// Bytes kept; the file has been truncated to this length
    pub verified_len: u64,
    /// Chunks covered by `verified_len`
    pub chunks_verified: usize,
    /// The partial file failed verification and was emptied
    pub discarded: bool,
}

/// Check a partial file and cut it back to what can be trusted.
///
/// Without a chunklist every byte on disk is kept. With one, only the chunks
/// lying fully inside the file are kept, and a file whose chunks do not
/// match is emptied.
///
/// # Errors
///
/// Returns an error if the file cannot be read or truncated, or on cancellation.
pub(super) async fn inspect_partial(
    dest_path: &Path,
    chunklist: Option<&Chunklist>,
    cancel: &CancellationToken,
) -> Result<PartialCheck, Error> {
    let on_disk = match tokio_fs::metadata(dest_path).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => return Ok(PartialCheck::default()),
    };
    if on_disk == 0 {
        return Ok(PartialCheck::default());
    }

    let Some(chunklist) = chunklist else {
        return Ok(PartialCheck {
            on_disk,
            verified_len: on_disk,
            chunks_verified: 0,
            discarded: false,
        });
    };

    if on_disk > chunklist.total_size() {
        truncate(dest_path, 0).await?;
        return Ok(PartialCheck {
            on_disk,
            discarded: true,
            ..PartialCheck::default()
        });
    }

    let file = tokio_fs::File::open(dest_path)
        .await
        .map_err(|e| Error::io_with_path(&e, dest_path))?;
    match verify_prefix(chunklist, tokio::io::BufReader::new(file), on_disk, cancel).await {
        Ok(report) => {
            if report.verified_len < on_disk {
                truncate(dest_path, report.verified_len).await?;
            }
            Ok(PartialCheck {
                on_disk,
                verified_len: report.verified_len,
                chunks_verified: report.chunks_verified,
                discarded: false,
            })
        }
        Err(Error::Integrity(e)) => {
            tracing::warn!(path = %dest_path.display(), error = %e, "discarding corrupt partial file");
            truncate(dest_path, 0).await?;
            Ok(PartialCheck {
                on_disk,
                discarded: true,
                ..PartialCheck::default()
            })
        }
        Err(e) => Err(e),
    }
}

async fn truncate(dest_path: &Path, len: u64) -> Result<(), Error> {
    let file = OpenOptions::new()
        .write(true)
        .open(dest_path)
        .await
        .map_err(|e| Error::io_with_path(&e, dest_path))?;
    file.set_len(len)
        .await
        .map_err(|e| Error::io_with_path(&e, dest_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use macfetch_chunklist::ChunklistBuilder;

    fn payload() -> Vec<u8> {
        (0u8..=255).cycle().take(100).collect()
    }

    #[tokio::test]
    async fn missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let check = inspect_partial(&dir.path().join("none"), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(check, PartialCheck::default());
    }

    #[tokio::test]
    async fn keeps_whole_chunks_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial");
        let data = payload();
        tokio::fs::write(&path, &data[..35]).await.unwrap();
        let chunklist = ChunklistBuilder::new()
            .chunk_size(10)
            .build_unsigned(&data)
            .unwrap();

        let check = inspect_partial(&path, Some(&chunklist), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(check.verified_len, 30);
        assert_eq!(check.chunks_verified, 3);
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 30);
    }

    #[tokio::test]
    async fn corrupt_prefix_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial");
        let data = payload();
        let mut partial = data[..35].to_vec();
        partial[3] ^= 0xFF;
        tokio::fs::write(&path, &partial).await.unwrap();
        let chunklist = ChunklistBuilder::new()
            .chunk_size(10)
            .build_unsigned(&data)
            .unwrap();

        let check = inspect_partial(&path, Some(&chunklist), &CancellationToken::new())
            .await
            .unwrap();
        assert!(check.discarded);
        assert_eq!(check.verified_len, 0);
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn without_chunklist_everything_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial");
        tokio::fs::write(&path, b"0123456").await.unwrap();
        let check = inspect_partial(&path, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(check.verified_len, 7);
    }
}
