//! The retrying downloader

use super::config::{DownloadOptions, DownloadTask, DownloaderConfig};
use super::registry::{DestinationClaim, DestinationRegistry};
use super::resume::inspect_partial;
use super::stream::{stream_to_file, ProgressReporter, StreamParams};
use super::validation::{accepts_ranges, validate_response, RangeOutcome};
use crate::client::{map_reqwest_error, status_error, NetClient, NetConfig};
use crate::retry::RetryPolicy;
use futures::StreamExt;
use macfetch_chunklist::{ChunkVerifier, Chunklist};
use macfetch_config::Config;
use macfetch_errors::{Error, FormatError, NetworkError};
use macfetch_events::{
    AppEvent, DownloadEvent, EventEmitter, EventSender, FailureContext, VerificationEvent,
};
use macfetch_types::TaskStatus;
use reqwest::header::RANGE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::io::SeekFrom;
use std::path::Path;
use std::time::Instant;
use tokio::fs::{self as tokio_fs, File, OpenOptions};
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;

/// Downloads URLs to files under one retry policy
///
/// Every transfer resumes from verified bytes already on disk when it can,
/// is retried on transient failures, and stops promptly on cancellation.
/// A destination path is owned by at most one transfer at a time.
#[derive(Clone, Debug)]
pub struct RetryingDownloader {
    client: NetClient,
    policy: RetryPolicy,
    config: DownloaderConfig,
    registry: DestinationRegistry,
    events: Option<EventSender>,
}

impl EventEmitter for RetryingDownloader {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl RetryingDownloader {
    #[must_use]
    pub fn new(client: NetClient, policy: RetryPolicy, config: DownloaderConfig) -> Self {
        Self {
            client,
            policy,
            config,
            registry: DestinationRegistry::new(),
            events: None,
        }
    }

    /// Build a downloader from application configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let client = NetClient::new(NetConfig::from(&config.network))?;
        Ok(Self::new(
            client,
            RetryPolicy::from(&config.network),
            DownloaderConfig::from(config),
        ))
    }

    /// A downloader sharing this one's client and destination registry that
    /// reports through `events`
    #[must_use]
    pub fn with_events(&self, events: EventSender) -> Self {
        Self {
            events: Some(events),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn client(&self) -> &NetClient {
        &self.client
    }

    #[must_use]
    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// Download `url` to `destination`.
    ///
    /// With a chunklist in `options`, the payload is verified while it
    /// streams and a resumed transfer only keeps chunks that verify. A
    /// cancelled or failed transfer leaves its bytes on disk for a later
    /// resume, except bytes of a chunk that failed verification.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::DestinationBusy` when another transfer owns
    /// `destination`, the first permanent error, the last transient error
    /// once retries are exhausted, or `Error::Cancelled`.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<DownloadTask, Error> {
        crate::parse_url(url)?;
        let _claim = self.registry.claim(destination)?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio_fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::io_with_path(&e, parent))?;
            }
        }

        let started = Instant::now();
        let result = self
            .policy
            .run(url, cancel, self, |attempt| {
                self.attempt(url, destination, options, cancel, attempt)
            })
            .await;

        match &result {
            Ok(task) => {
                tracing::info!(
                    target: "macfetch::net",
                    url,
                    bytes = task.total_size,
                    verified = task.verified,
                    retries = task.retries,
                    "download complete"
                );
                self.emit(AppEvent::Download(DownloadEvent::Completed {
                    url: url.to_string(),
                    bytes: task.total_size,
                    elapsed: started.elapsed(),
                    verified: task.verified,
                }));
            }
            Err(Error::Cancelled) => {
                let bytes_on_disk = tokio_fs::metadata(destination)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                tracing::info!(target: "macfetch::net", url, bytes_on_disk, "download cancelled");
                self.emit(AppEvent::Download(DownloadEvent::Cancelled {
                    url: url.to_string(),
                    bytes_on_disk,
                }));
            }
            Err(e) => {
                tracing::error!(target: "macfetch::net", url, error = %e, "download failed");
                if matches!(e, Error::Integrity(_)) {
                    self.emit(AppEvent::Verification(VerificationEvent::Failed {
                        path: destination.display().to_string(),
                        failure: FailureContext::from_error(e),
                    }));
                }
                self.emit(AppEvent::Download(DownloadEvent::Failed {
                    url: url.to_string(),
                    failure: FailureContext::from_error(e),
                }));
            }
        }

        result
    }

    async fn attempt(
        &self,
        url: &str,
        destination: &Path,
        options: &DownloadOptions,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<DownloadTask, Error> {
        let mut task = DownloadTask::new(url, destination.to_path_buf());
        task.retries = attempt;
        task.advance(TaskStatus::Active);

        let chunklist = options.chunklist.as_deref();
        let mut offset = if options.resume {
            self.resume_offset(url, destination, chunklist, options, cancel)
                .await?
        } else {
            0
        };

        if let Some(chunklist) = chunklist {
            if offset > 0 && offset == chunklist.total_size() {
                tracing::debug!(target: "macfetch::net", url, "destination already complete");
                let mut progress = self.reporter(url, Some(offset), options);
                progress.report(offset, true);
                task.resumed_from = offset;
                task.total_size = offset;
                task.verified = true;
                task.advance(TaskStatus::Completed);
                return Ok(task);
            }
        }

        let mut response = self.get(url, options, offset).await?;
        let mut outcome = validate_response(&response, offset, url)?;

        if outcome == RangeOutcome::Unsatisfiable {
            self.restarted(url, "server rejected the resume range");
            offset = 0;
            response = self.get(url, options, 0).await?;
            outcome = validate_response(&response, 0, url)?;
        }

        let total = match outcome {
            RangeOutcome::Resumed { total } => {
                total.or_else(|| response.content_length().map(|len| offset + len))
            }
            RangeOutcome::Full { total } => {
                if offset > 0 {
                    self.restarted(url, "server ignored the resume range");
                    offset = 0;
                }
                total
            }
            RangeOutcome::Unsatisfiable => {
                return Err(NetworkError::InvalidResponse {
                    url: url.to_string(),
                    reason: "range not satisfiable for a full request".to_string(),
                }
                .into())
            }
        };

        if let (Some(chunklist), Some(total)) = (chunklist, total) {
            if total != chunklist.total_size() {
                return Err(FormatError::SizeMismatch {
                    declared: chunklist.total_size(),
                    actual: total,
                }
                .into());
            }
        }
        let total = total.or_else(|| chunklist.map(Chunklist::total_size));

        let mut file = open_destination(destination, offset).await?;
        task.resumed_from = offset;

        tracing::debug!(target: "macfetch::net", url, offset, ?total, attempt, "transfer starting");
        self.emit(AppEvent::Download(DownloadEvent::Started {
            url: url.to_string(),
            total_bytes: total,
            resumed_from: offset,
        }));

        let mut verifier = chunklist
            .map(|chunklist| ChunkVerifier::new(chunklist, offset))
            .transpose()?;
        let params = StreamParams {
            url,
            offset,
            increment: options
                .increment_size
                .unwrap_or(self.config.increment_size)
                .max(1),
            idle_timeout: self.policy.attempt_timeout,
            cancel,
        };
        let mut progress = self.reporter(url, total, options);
        let written = stream_to_file(
            response,
            &mut file,
            verifier.as_mut(),
            &params,
            &mut progress,
        )
        .await?;

        if let Some(total) = total {
            if offset + written != total {
                return Err(NetworkError::DownloadFailed(format!(
                    "{url}: body ended after {} of {total} bytes",
                    offset + written
                ))
                .into());
            }
        }

        if let Some(verifier) = verifier {
            let report = verifier.finish()?;
            self.emit(AppEvent::Verification(VerificationEvent::PayloadVerified {
                path: destination.display().to_string(),
                bytes: report.bytes_verified,
                chunks: report.chunks_verified,
            }));
            task.verified = true;
        }

        task.bytes_fetched = written;
        task.total_size = offset + written;
        task.advance(TaskStatus::Completed);
        Ok(task)
    }

    /// Decide where the next attempt starts
    async fn resume_offset(
        &self,
        url: &str,
        destination: &Path,
        chunklist: Option<&Chunklist>,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<u64, Error> {
        let check = inspect_partial(destination, chunklist, cancel).await?;
        if check.discarded {
            self.restarted(url, "partial file failed verification");
        }
        if check.verified_len == 0 {
            return Ok(0);
        }

        if chunklist.is_some() {
            self.emit(AppEvent::Verification(VerificationEvent::PrefixVerified {
                verified_len: check.verified_len,
                chunks_verified: check.chunks_verified,
            }));
        }
        self.emit(AppEvent::Download(DownloadEvent::Resuming {
            url: url.to_string(),
            verified_len: check.verified_len,
            on_disk: check.on_disk,
        }));

        if chunklist.is_some_and(|c| check.verified_len == c.total_size()) {
            return Ok(check.verified_len);
        }

        match self.probe_ranges(url, options).await {
            Ok(true) => Ok(check.verified_len),
            Ok(false) => {
                self.restarted(url, "server does not accept byte ranges");
                Ok(0)
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                tracing::debug!(target: "macfetch::net", url, error = %e, "range probe failed");
                self.restarted(url, "range probe failed");
                Ok(0)
            }
        }
    }

    async fn probe_ranges(&self, url: &str, options: &DownloadOptions) -> Result<bool, Error> {
        let request = with_headers(self.client.inner().head(url), &options.headers);
        let response = self.client.send_once(request, url).await?;
        if !response.status().is_success() {
            return Err(status_error(response.status()).into());
        }
        Ok(accepts_ranges(&response))
    }

    async fn get(
        &self,
        url: &str,
        options: &DownloadOptions,
        offset: u64,
    ) -> Result<Response, Error> {
        let mut request = with_headers(self.client.inner().get(url), &options.headers);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        self.client.send_once(request, url).await
    }

    fn reporter(&self, url: &str, total: Option<u64>, options: &DownloadOptions) -> ProgressReporter {
        ProgressReporter::new(
            url,
            total,
            options
                .progress_interval
                .unwrap_or(self.config.progress_interval),
            options.on_progress.clone(),
            self.events.clone(),
        )
    }

    fn restarted(&self, url: &str, reason: &str) {
        tracing::info!(target: "macfetch::net", url, reason, "restarting transfer from zero");
        self.emit(AppEvent::Download(DownloadEvent::Restarted {
            url: url.to_string(),
            reason: reason.to_string(),
        }));
    }

    /// Fetch a small body such as a chunklist into memory, under the retry policy.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::ResponseTooLarge` for bodies above the configured
    /// cap, `HttpError` for statuses other than success, or `Error::Cancelled`.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        headers: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        crate::parse_url(url)?;
        self.policy
            .run(url, cancel, self, |_| async move {
                let request = with_headers(self.client.inner().get(url), headers);
                let response = self.client.send_once(request, url).await?;
                if !response.status().is_success() {
                    return Err(status_error(response.status()).into());
                }
                self.read_capped(response, url, cancel).await
            })
            .await
    }

    async fn read_capped(
        &self,
        response: Response,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        let limit = self.config.max_body_size;
        if let Some(size) = response.content_length() {
            if size > limit {
                return Err(NetworkError::ResponseTooLarge { size, limit }.into());
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                next = tokio::time::timeout(self.policy.attempt_timeout, stream.next()) => next,
            };
            match next {
                Ok(Some(Ok(bytes))) => {
                    let size = (body.len() + bytes.len()) as u64;
                    if size > limit {
                        return Err(NetworkError::ResponseTooLarge { size, limit }.into());
                    }
                    body.extend_from_slice(&bytes);
                }
                Ok(Some(Err(e))) => return Err(map_reqwest_error(&e, url).into()),
                Ok(None) => return Ok(body),
                Err(_) => {
                    return Err(NetworkError::Timeout {
                        url: url.to_string(),
                    }
                    .into())
                }
            }
        }
    }

    /// Send a request under the retry policy.
    ///
    /// Server errors and 429 are retried; any other status is handed back
    /// to the caller, which decides what it means.
    ///
    /// # Errors
    ///
    /// Returns transport errors, the last retryable status once retries are
    /// exhausted, or `Error::Cancelled`.
    pub async fn send<F>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        make_request: F,
    ) -> Result<Response, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.policy
            .run(label, cancel, self, |_| {
                let request = make_request(self.client.inner());
                async move {
                    let response = self.client.send_once(request, label).await?;
                    let status = response.status();
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(status_error(status).into());
                    }
                    Ok(response)
                }
            })
            .await
    }

    /// Send a request and read its body as one retried operation.
    ///
    /// A connection dropped or stalled while the body streams is retried
    /// like a failure before the headers. The body is capped like
    /// [`Self::fetch_bytes`]; status handling follows [`Self::send`].
    ///
    /// # Errors
    ///
    /// Returns transport errors, the last retryable status once retries are
    /// exhausted, `NetworkError::ResponseTooLarge`, or `Error::Cancelled`.
    pub async fn send_for_body<F>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        make_request: F,
    ) -> Result<(StatusCode, Vec<u8>), Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.policy
            .run(label, cancel, self, |_| {
                let request = make_request(self.client.inner());
                async move {
                    let response = self.client.send_once(request, label).await?;
                    let status = response.status();
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(status_error(status).into());
                    }
                    let body = self.read_capped(response, label, cancel).await?;
                    Ok((status, body))
                }
            })
            .await
    }

    /// Write a small artifact such as a chunklist to `destination` under a
    /// destination claim.
    ///
    /// The claim is handed back so the caller owns the path until the
    /// payload the artifact describes is in place.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::DestinationBusy` when another task holds
    /// `destination`, or an I/O error.
    pub async fn store(&self, destination: &Path, bytes: &[u8]) -> Result<DestinationClaim, Error> {
        let claim = self.registry.claim(destination)?;
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio_fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::io_with_path(&e, parent))?;
            }
        }
        tokio_fs::write(destination, bytes)
            .await
            .map_err(|e| Error::io_with_path(&e, destination))?;
        tracing::debug!(target: "macfetch::net", path = %destination.display(), bytes = bytes.len(), "artifact stored");
        Ok(claim)
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(String, String)]) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

async fn open_destination(destination: &Path, offset: u64) -> Result<File, Error> {
    let io_err = |e: std::io::Error| Error::io_with_path(&e, destination);
    if offset == 0 {
        return File::create(destination).await.map_err(io_err);
    }
    let mut file = OpenOptions::new()
        .write(true)
        .open(destination)
        .await
        .map_err(io_err)?;
    file.set_len(offset).await.map_err(io_err)?;
    file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;
    Ok(file)
}
