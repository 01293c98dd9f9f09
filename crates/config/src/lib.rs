#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for macfetch
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/macfetch/config.toml)
//! - Environment variables (`MACFETCH_*`)
//! - CLI flags (applied by the front end)

pub mod constants;

use macfetch_errors::{ConfigError, Error};
use macfetch_signing::TrustedKeyRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_parallel_downloads")]
    pub parallel_downloads: usize,
    /// Minimum spacing of progress notifications, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Bytes written between cancellation checks
    #[serde(default = "default_transfer_increment")]
    pub transfer_increment: usize,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-attempt timeout: connect plus response headers, then each body read
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Recovery server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_url")]
    pub base_url: String,
    /// MLB serial sent when none is given on the command line
    #[serde(default)]
    pub default_mlb: Option<String>,
    /// Session lifetime assumed when the server sends no `Max-Age`
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64, // seconds
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_verify_chunklists")]
    pub verify_chunklists: bool,
    /// Accept digest-only chunklists that carry no signature
    #[serde(default)]
    pub allow_unsigned: bool,
    /// Additional RSA keys trusted next to the built-in one
    #[serde(default)]
    pub trusted_keys: Vec<TrustedKeyRef>,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub download_root: Option<PathBuf>,
    /// Board dataset replacing the built-in one
    pub board_dataset: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            parallel_downloads: default_parallel_downloads(),
            progress_interval_ms: default_progress_interval_ms(),
            transfer_increment: default_transfer_increment(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            retries: default_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
            user_agent: None,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_recovery_url(),
            default_mlb: None,
            session_ttl: default_session_ttl(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            verify_chunklists: true,
            allow_unsigned: false,
            trusted_keys: Vec::new(),
        }
    }
}

// Default value functions for serde
fn default_parallel_downloads() -> usize {
    2
}

fn default_progress_interval_ms() -> u64 {
    250
}

fn default_transfer_increment() -> usize {
    64 * 1024
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_recovery_url() -> String {
    constants::RECOVERY_BASE_URL.to_string()
}

fn default_session_ttl() -> u64 {
    30 * 60
}

fn default_verify_chunklists() -> bool {
    true
}

impl NetworkConfig {
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .unwrap_or(constants::DOWNLOAD_USER_AGENT)
    }
}

impl RecoveryConfig {
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }
}

impl GeneralConfig {
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join(constants::APP_DIR).join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// or holds values that fail validation.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or parsed.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Some(downloads) = env_parse("MACFETCH_PARALLEL_DOWNLOADS")? {
            self.general.parallel_downloads = downloads;
        }

        if let Some(retries) = env_parse("MACFETCH_RETRIES")? {
            self.network.retries = retries;
        }

        if let Some(timeout) = env_parse("MACFETCH_TIMEOUT")? {
            self.network.timeout = timeout;
        }

        if let Ok(url) = std::env::var("MACFETCH_RECOVERY_URL") {
            self.recovery.base_url = url;
        }

        if let Ok(root) = std::env::var("MACFETCH_DOWNLOAD_ROOT") {
            self.paths.download_root = Some(PathBuf::from(root));
        }

        if let Ok(dataset) = std::env::var("MACFETCH_BOARD_DATASET") {
            self.paths.board_dataset = Some(PathBuf::from(dataset));
        }

        if let Ok(value) = std::env::var("MACFETCH_ALLOW_UNSIGNED") {
            self.security.allow_unsigned = match value.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "MACFETCH_ALLOW_UNSIGNED".to_string(),
                        value,
                    }
                    .into())
                }
            };
        }

        self.validate()
    }

    /// Reject values the runtime cannot work with
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |field: &str, value: String| -> Result<(), Error> {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value,
            }
            .into())
        };

        if self.general.parallel_downloads == 0 {
            return invalid("general.parallel_downloads", "0".to_string());
        }
        if self.general.transfer_increment == 0 {
            return invalid("general.transfer_increment", "0".to_string());
        }
        if self.network.timeout == 0 {
            return invalid("network.timeout", "0".to_string());
        }
        if self.network.backoff_multiplier < 1.0 {
            return invalid(
                "network.backoff_multiplier",
                self.network.backoff_multiplier.to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.network.jitter_factor) {
            return invalid(
                "network.jitter_factor",
                self.network.jitter_factor.to_string(),
            );
        }
        if !(self.recovery.base_url.starts_with("http://")
            || self.recovery.base_url.starts_with("https://"))
        {
            return invalid("recovery.base_url", self.recovery.base_url.clone());
        }
        Ok(())
    }

    /// Root of the destination tree
    #[must_use]
    pub fn download_root(&self) -> PathBuf {
        self.paths.download_root.clone().unwrap_or_else(|| {
            dirs::download_dir()
                .map(|dir| dir.join(constants::APP_DIR))
                .unwrap_or_else(|| PathBuf::from(constants::APP_DIR))
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, Error> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                value,
            }
            .into()),
        Err(_) => Ok(None),
    }
}
