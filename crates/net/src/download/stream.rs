//! Low-level streaming download mechanics

use futures::StreamExt;
use macfetch_chunklist::ChunkVerifier;
use macfetch_errors::{Error, NetworkError};
use macfetch_events::{AppEvent, DownloadEvent, EventSender};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::config::{DownloadProgress, ProgressCallback};
use crate::client::map_reqwest_error;

/// Throttled progress delivery to the caller and the event bus
pub(super) struct ProgressReporter {
    url: String,
    total: Option<u64>,
    interval: Duration,
    last: Option<Instant>,
    callback: Option<ProgressCallback>,
    events: Option<EventSender>,
}

impl ProgressReporter {
    pub(super) fn new(
        url: &str,
        total: Option<u64>,
        interval: Duration,
        callback: Option<ProgressCallback>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            url: url.to_string(),
            total,
            interval,
            last: None,
            callback,
            events,
        }
    }

    /// Deliver a notification; unforced ones are dropped inside the interval
    pub(super) fn report(&mut self, bytes_transferred: u64, force: bool) {
        if !force && self.last.is_some_and(|last| last.elapsed() < self.interval) {
            return;
        }
        self.last = Some(Instant::now());

        if let Some(callback) = &self.callback {
            callback(DownloadProgress {
                bytes_transferred,
                total_bytes: self.total,
            });
        }
        if let Some(events) = &self.events {
            events.send(AppEvent::Download(DownloadEvent::Progress {
                url: self.url.clone(),
                bytes_transferred,
                total_bytes: self.total,
            }));
        }
    }
}

/// Parameters for streaming a response body to disk
pub(super) struct StreamParams<'a> {
    pub url: &'a str,
    /// Bytes already in the file
    pub offset: u64,
    /// Bytes written between cancellation checks
    pub increment: usize,
    /// Longest wait for the next body read
    pub idle_timeout: Duration,
    pub cancel: &'a CancellationToken,
}

/// Stream a response body into `file`, verifying inline when a verifier is supplied.
///
/// Returns the number of bytes written. On cancellation the file is flushed,
/// a final notification with the exact bytes on disk is delivered and
/// `Error::Cancelled` is returned. On a chunk mismatch the file is cut back
/// to the last verified chunk.
pub(super) async fn stream_to_file(
    response: reqwest::Response,
    file: &mut File,
    mut verifier: Option<&mut ChunkVerifier<'_>>,
    params: &StreamParams<'_>,
    progress: &mut ProgressReporter,
) -> Result<u64, Error> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    progress.report(params.offset, true);

    loop {
        let next = tokio::select! {
            biased;
            () = params.cancel.cancelled() => {
                return cancelled(file, params.offset + written, progress).await;
            }
            next = tokio::time::timeout(params.idle_timeout, stream.next()) => next,
        };

        let bytes = match next {
            Ok(Some(Ok(bytes))) => bytes,
            Ok(Some(Err(e))) => {
                file.flush().await?;
                return Err(map_reqwest_error(&e, params.url).into());
            }
            Ok(None) => break,
            Err(_) => {
                file.flush().await?;
                return Err(NetworkError::Timeout {
                    url: params.url.to_string(),
                }
                .into());
            }
        };

        for piece in bytes.chunks(params.increment) {
            if params.cancel.is_cancelled() {
                return cancelled(file, params.offset + written, progress).await;
            }

            if let Some(verifier) = verifier.as_deref_mut() {
                if let Err(e) = verifier.update(piece) {
                    file.flush().await?;
                    file.set_len(verifier.verified_len()).await?;
                    return Err(e);
                }
            }

            file.write_all(piece).await?;
            written += piece.len() as u64;
            progress.report(params.offset + written, false);
        }
    }

    file.flush().await?;
    progress.report(params.offset + written, true);
    Ok(written)
}

async fn cancelled(
    file: &mut File,
    bytes_on_disk: u64,
    progress: &mut ProgressReporter,
) -> Result<u64, Error> {
    file.flush().await?;
    progress.report(bytes_on_disk, true);
    Err(Error::Cancelled)
}
