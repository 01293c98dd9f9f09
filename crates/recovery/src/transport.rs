//! Wire protocol seam of the recovery client

use async_trait::async_trait;
use macfetch_errors::Error;
use macfetch_net::{DestinationClaim, DownloadOptions, DownloadTask};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::query::{ImageInfo, ImageQuery};
use crate::session::Session;

/// The exchanges the recovery protocol is made of
///
/// [`crate::HttpTransport`] speaks the vendor protocol; tests substitute
/// scripted transports.
#[async_trait]
pub trait RecoveryTransport: Send + Sync {
    /// Obtain a fresh session.
    ///
    /// A rejection by the server is `RecoveryError::Auth` and is not retried.
    async fn acquire_session(&self, cancel: &CancellationToken) -> Result<Session, Error>;

    /// Send the image query under `session`.
    ///
    /// A server that no longer accepts the session answers with
    /// `RecoveryError::SessionExpired`.
    async fn query_image(
        &self,
        session: &Session,
        query: &ImageQuery,
        cancel: &CancellationToken,
    ) -> Result<ImageInfo, Error>;

    /// Fetch the raw chunklist named by `info`
    async fn fetch_chunklist(
        &self,
        info: &ImageInfo,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error>;

    /// Write an accepted chunklist to `destination`, returning the claim
    /// that keeps other tasks off the path
    async fn store_chunklist(
        &self,
        destination: &Path,
        bytes: &[u8],
    ) -> Result<DestinationClaim, Error>;

    /// Download the image named by `info` to `destination`
    async fn download_image(
        &self,
        info: &ImageInfo,
        destination: &Path,
        options: DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<DownloadTask, Error>;
}
