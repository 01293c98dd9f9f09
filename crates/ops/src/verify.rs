//! Offline verification of a file already on disk

use macfetch_chunklist::{verify_file, Chunklist, FileReport};
use macfetch_errors::Error;
use macfetch_events::{AppEvent, EventEmitter, FailureContext, VerificationEvent};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::OpsCtx;

/// Check `payload` against the chunklist at `chunklist_path`: signature
/// first, then every chunk.
///
/// # Errors
///
/// Returns format, signature, integrity or I/O errors, or
/// `Error::Cancelled`.
pub async fn verify_download(
    ctx: &OpsCtx,
    chunklist_path: &Path,
    payload: &Path,
    cancel: &CancellationToken,
) -> Result<FileReport, Error> {
    let chunklist = Chunklist::from_file(chunklist_path).await?;
    let verification = cancel.child_token();

    let result = verify_file(
        &chunklist,
        payload,
        &ctx.trusted_keys,
        ctx.config.security.allow_unsigned,
        &verification,
    )
    .await;

    match &result {
        Ok(report) => {
            ctx.tx.emit(AppEvent::Verification(VerificationEvent::SignatureVerified {
                key_id: report.key_id.clone(),
                chunk_count: chunklist.chunks().len(),
            }));
            ctx.tx.emit(AppEvent::Verification(VerificationEvent::PayloadVerified {
                path: payload.display().to_string(),
                bytes: report.bytes_verified,
                chunks: report.chunks_verified,
            }));
        }
        Err(Error::Cancelled) => {}
        Err(e) => ctx.tx.emit(AppEvent::Verification(VerificationEvent::Failed {
            path: payload.display().to_string(),
            failure: FailureContext::from_error(e),
        })),
    }

    result
}
