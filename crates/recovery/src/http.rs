//! Recovery protocol over HTTP

use async_trait::async_trait;
use macfetch_config::constants::RECOVERY_USER_AGENT;
use macfetch_config::Config;
use macfetch_errors::{Error, NetworkError, RecoveryError};
use macfetch_net::{DestinationClaim, DownloadOptions, DownloadTask, RetryingDownloader};
use reqwest::header::{CONNECTION, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::query::{ImageInfo, ImageQuery};
use crate::session::{parse_session_cookie, Session};
use crate::transport::RecoveryTransport;

/// The vendor recovery protocol, carried by the shared downloader
#[derive(Debug, Clone)]
pub struct HttpTransport {
    downloader: RetryingDownloader,
    base_url: Url,
    session_ttl: Duration,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an http(s) URL.
    pub fn new(
        downloader: RetryingDownloader,
        base_url: &str,
        session_ttl: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            downloader,
            base_url: macfetch_net::parse_url(base_url)?,
            session_ttl,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the configured recovery URL is invalid.
    pub fn from_config(downloader: RetryingDownloader, config: &Config) -> Result<Self, Error> {
        Self::new(
            downloader,
            &config.recovery.base_url,
            config.recovery.session_ttl(),
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn protocol_headers(request: RequestBuilder) -> RequestBuilder {
    request
        .header(CONNECTION, "close")
        .header(USER_AGENT, RECOVERY_USER_AGENT)
}

fn asset_headers(token: &str) -> Vec<(String, String)> {
    vec![
        (COOKIE.to_string(), format!("AssetToken={token}")),
        (USER_AGENT.to_string(), RECOVERY_USER_AGENT.to_string()),
    ]
}

fn unexpected_status(status: StatusCode) -> Error {
    NetworkError::http(
        status.as_u16(),
        status.canonical_reason().unwrap_or("unknown status"),
    )
    .into()
}

#[async_trait]
impl RecoveryTransport for HttpTransport {
    async fn acquire_session(&self, cancel: &CancellationToken) -> Result<Session, Error> {
        let url = self.base_url.as_str();
        let response = self
            .downloader
            .send(url, cancel, |client| protocol_headers(client.get(url)))
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RecoveryError::Auth {
                reason: format!("server answered {status}"),
            }
            .into());
        }
        if !status.is_success() {
            return Err(unexpected_status(status));
        }

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(parse_session_cookie)
            .ok_or_else(|| RecoveryError::Auth {
                reason: "response carried no session cookie".to_string(),
            })?;

        let ttl = cookie.max_age.map_or(self.session_ttl, Duration::from_secs);
        tracing::debug!(target: "macfetch::recovery", ?ttl, "session cookie received");
        Ok(Session::new(cookie.token, ttl))
    }

    async fn query_image(
        &self,
        session: &Session,
        query: &ImageQuery,
        cancel: &CancellationToken,
    ) -> Result<ImageInfo, Error> {
        let url = self
            .base_url
            .join(query.endpoint())
            .map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        let body = query.to_body();
        let cookie = session.cookie();

        let (status, reply) = self
            .downloader
            .send_for_body(url.as_str(), cancel, |client| {
                protocol_headers(client.post(url.clone()))
                    .header(CONTENT_TYPE, "text/plain")
                    .header(COOKIE, cookie.as_str())
                    .body(body.clone())
            })
            .await?;

        match status {
            StatusCode::UNAUTHORIZED => return Err(RecoveryError::SessionExpired.into()),
            StatusCode::FORBIDDEN => {
                return Err(RecoveryError::Auth {
                    reason: "image query forbidden".to_string(),
                }
                .into())
            }
            status if !status.is_success() => return Err(unexpected_status(status)),
            _ => {}
        }

        let text = String::from_utf8(reply).map_err(|_| NetworkError::InvalidResponse {
            url: url.to_string(),
            reason: "image query reply is not UTF-8".to_string(),
        })?;
        ImageInfo::parse(&text)
    }

    async fn fetch_chunklist(
        &self,
        info: &ImageInfo,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        self.downloader
            .fetch_bytes(
                &info.chunklist_url,
                &asset_headers(&info.chunklist_token),
                cancel,
            )
            .await
    }

    async fn store_chunklist(
        &self,
        destination: &Path,
        bytes: &[u8],
    ) -> Result<DestinationClaim, Error> {
        self.downloader.store(destination, bytes).await
    }

    async fn download_image(
        &self,
        info: &ImageInfo,
        destination: &Path,
        mut options: DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<DownloadTask, Error> {
        options.headers.extend(asset_headers(&info.image_token));
        self.downloader
            .download(&info.image_url, destination, &options, cancel)
            .await
    }
}
