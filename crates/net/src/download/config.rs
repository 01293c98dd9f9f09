//! Configuration, options and results for downloads

use macfetch_chunklist::{Chunklist, MAX_CHUNKLIST_SIZE};
use macfetch_config::Config;
use macfetch_types::TaskStatus;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Downloader-wide settings
#[derive(Clone, Debug)]
pub struct DownloaderConfig {
    /// Default bytes written between cancellation checks
    pub increment_size: usize,
    /// Default minimum spacing between progress notifications
    pub progress_interval: Duration,
    /// Cap on bodies fetched into memory
    pub max_body_size: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            increment_size: 64 * 1024,
            progress_interval: Duration::from_millis(250),
            max_body_size: MAX_CHUNKLIST_SIZE,
        }
    }
}

impl From<&Config> for DownloaderConfig {
    fn from(config: &Config) -> Self {
        Self {
            increment_size: config.general.transfer_increment,
            progress_interval: config.general.progress_interval(),
            ..Self::default()
        }
    }
}

/// Progress notification: bytes on disk and the expected total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
}

/// Caller-supplied progress sink
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Per-request options
#[derive(Clone)]
pub struct DownloadOptions {
    /// Continue from a partial destination file when possible
    pub resume: bool,
    /// Verify the payload against this chunklist while it streams
    pub chunklist: Option<Arc<Chunklist>>,
    pub increment_size: Option<usize>,
    pub progress_interval: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    /// Extra request headers, e.g. the asset token cookie
    pub headers: Vec<(String, String)>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            resume: true,
            chunklist: None,
            increment_size: None,
            progress_interval: None,
            on_progress: None,
            headers: Vec::new(),
        }
    }
}

impl DownloadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub fn with_chunklist(mut self, chunklist: Arc<Chunklist>) -> Self {
        self.chunklist = Some(chunklist);
        self
    }

    #[must_use]
    pub fn with_increment_size(mut self, size: usize) -> Self {
        self.increment_size = Some(size.max(1));
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach the `AssetToken` cookie recovery assets require
    #[must_use]
    pub fn with_asset_token(self, token: &str) -> Self {
        self.with_header("Cookie", format!("AssetToken={token}"))
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("resume", &self.resume)
            .field("chunklist", &self.chunklist.as_ref().map(|c| c.chunks().len()))
            .field("increment_size", &self.increment_size)
            .field("progress_interval", &self.progress_interval)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

/// Record of one requested file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    /// Verified bytes already on disk when the final attempt started
    pub resumed_from: u64,
    pub retries: u32,
    pub status: TaskStatus,
    /// Bytes fetched over the network by the final attempt
    pub bytes_fetched: u64,
    pub total_size: u64,
    /// Every byte was checked against a chunklist
    pub verified: bool,
}

impl DownloadTask {
    pub(super) fn new(url: &str, destination: PathBuf) -> Self {
        Self {
            url: url.to_string(),
            destination,
            resumed_from: 0,
            retries: 0,
            status: TaskStatus::Pending,
            bytes_fetched: 0,
            total_size: 0,
            verified: false,
        }
    }

    /// Move to `next` if the transition is legal; illegal moves are ignored
    pub(super) fn advance(&mut self, next: TaskStatus) {
        if self.status.can_advance_to(next) {
            self.status = next;
        } else {
            tracing::debug!(from = %self.status, to = %next, "ignored status regression");
        }
    }
}
