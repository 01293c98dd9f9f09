//! Operations context for dependency injection

use macfetch_boards::BoardRegistry;
use macfetch_config::Config;
use macfetch_errors::{Error, TaskError};
use macfetch_events::EventSender;
use macfetch_net::RetryingDownloader;
use macfetch_signing::TrustedKey;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared components every task runs against
#[derive(Debug, Clone)]
pub struct OpsCtx {
    /// Downloader; its destination registry is shared by all tasks
    pub downloader: RetryingDownloader,
    /// Board lookup table
    pub registry: Arc<BoardRegistry>,
    /// Keys accepted for chunklist signatures
    pub trusted_keys: Vec<TrustedKey>,
    /// Event sender for progress reporting
    pub tx: EventSender,
    /// System configuration
    pub config: Config,
}

impl OpsCtx {
    /// Assemble a context from configuration alone.
    ///
    /// Loads the board dataset named in `paths.board_dataset`, or uses the
    /// built-in one.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset, a configured key, or the HTTP client
    /// cannot be loaded.
    pub async fn from_config(config: Config, tx: EventSender) -> Result<Self, Error> {
        let registry = match &config.paths.board_dataset {
            Some(path) => Arc::new(BoardRegistry::from_file(path).await?),
            None => Arc::new(BoardRegistry::builtin()?.clone()),
        };

        OpsContextBuilder::new()
            .with_downloader(RetryingDownloader::from_config(&config)?)
            .with_registry(registry)
            .with_event_sender(tx)
            .with_config(config)
            .build()
    }

    /// Root of the destination tree
    #[must_use]
    pub fn download_root(&self) -> PathBuf {
        self.config.download_root()
    }
}

/// Builder for the operations context
#[derive(Default)]
pub struct OpsContextBuilder {
    downloader: Option<RetryingDownloader>,
    registry: Option<Arc<BoardRegistry>>,
    trusted_keys: Option<Vec<TrustedKey>>,
    tx: Option<EventSender>,
    config: Option<Config>,
}

impl OpsContextBuilder {
    /// Create new context builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the downloader
    #[must_use]
    pub fn with_downloader(mut self, downloader: RetryingDownloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Set the board registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<BoardRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the trusted keys derived from the configuration
    #[must_use]
    pub fn with_trusted_keys(mut self, keys: Vec<TrustedKey>) -> Self {
        self.trusted_keys = Some(keys);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context
    ///
    /// # Errors
    ///
    /// Returns an error if any required component is missing, or if a
    /// configured trusted key cannot be decoded.
    pub fn build(self) -> Result<OpsCtx, Error> {
        let missing = |component: &str| TaskError::MissingComponent {
            component: component.to_string(),
        };

        let downloader = self.downloader.ok_or_else(|| missing("downloader"))?;
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let tx = self.tx.ok_or_else(|| missing("event_sender"))?;
        let config = self.config.ok_or_else(|| missing("config"))?;
        let trusted_keys = match self.trusted_keys {
            Some(keys) => keys,
            None => macfetch_signing::trusted_keys(&config.security.trusted_keys)?,
        };

        Ok(OpsCtx {
            downloader,
            registry,
            trusted_keys,
            tx,
            config,
        })
    }
}
