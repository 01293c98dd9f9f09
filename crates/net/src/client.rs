//! HTTP client wrapper with per-attempt timeouts

use macfetch_config::NetworkConfig;
use macfetch_errors::{Error, NetworkError};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Bound on connecting plus receiving response headers, and on each
    /// body read afterwards
    pub attempt_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for NetConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            attempt_timeout: config.attempt_timeout(),
            connect_timeout: config.connect_timeout(),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 4,
            user_agent: config.user_agent().to_string(),
        }
    }
}

/// HTTP client shared by the downloader and the recovery transport
#[derive(Clone, Debug)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created with default settings.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(NetConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Access the inner client to build requests
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send one request, bounded by the attempt timeout up to the response headers
    ///
    /// Any status is returned as a response; status handling is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Timeout` when the headers do not arrive in time,
    /// or the mapped transport error.
    pub async fn send_once(&self, request: RequestBuilder, url: &str) -> Result<Response, Error> {
        match tokio::time::timeout(self.config.attempt_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(map_reqwest_error(&e, url).into()),
            Err(_) => Err(NetworkError::Timeout {
                url: url.to_string(),
            }
            .into()),
        }
    }
}

/// Map a transport error onto the network error taxonomy
pub(crate) fn map_reqwest_error(error: &reqwest::Error, url: &str) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_builder() {
        NetworkError::InvalidUrl(format!("{url}: {error}"))
    } else if error.is_connect() {
        NetworkError::ConnectionFailed(format!("{url}: {error}"))
    } else {
        NetworkError::DownloadFailed(format!("{url}: {error}"))
    }
}

/// Map a status that is not a success into an `HttpError`
pub(crate) fn status_error(status: reqwest::StatusCode) -> NetworkError {
    NetworkError::HttpError {
        status: status.as_u16(),
        message: status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string(),
    }
}
