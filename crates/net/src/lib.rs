#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for macfetch
//!
//! This crate handles all HTTP traffic: resumable payload transfers with
//! inline chunk verification, small-body fetches such as chunklists, and
//! the single retry policy every network call goes through.

mod client;
mod download;
mod retry;

pub use client::{NetClient, NetConfig};
pub use download::{
    DestinationClaim, DestinationRegistry, DownloadOptions, DownloadProgress, DownloadTask,
    DownloaderConfig, ProgressCallback, RetryingDownloader,
};
pub use retry::RetryPolicy;

use macfetch_errors::{Error, NetworkError};
use url::Url;

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed or uses a scheme other
/// than http or https.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(NetworkError::UnsupportedProtocol {
            protocol: scheme.to_string(),
        }
        .into()),
    }
}
