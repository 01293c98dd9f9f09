#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for macfetch
//!
//! This crate provides fine-grained error types organized by domain.
//! Every terminal failure can be reduced to a flat [`ErrorKind`] so callers
//! can decide on remediation without matching nested enums.

use std::borrow::Cow;

use thiserror::Error;

pub mod config;
pub mod format;
pub mod integrity;
pub mod network;
pub mod recovery;
pub mod signing;
pub mod task;

// Re-export all error types at the root
pub use config::ConfigError;
pub use format::FormatError;
pub use integrity::IntegrityError;
pub use network::NetworkError;
pub use recovery::RecoveryError;
pub use signing::SigningError;
pub use task::TaskError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("chunklist format error: {0}")]
    Format(#[from] FormatError),

    #[error("signature error: {0}")]
    Signing(#[from] SigningError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("task error: {0}")]
    Task(#[from] TaskError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        #[cfg_attr(feature = "serde", serde(with = "io_kind_as_str"))]
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

/// Flat classification of a terminal failure, reported in task outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    Format,
    Signature,
    Integrity,
    Network,
    Http,
    Auth,
    UnknownBoard,
    SessionExpired,
    Protocol,
    DestinationBusy,
    Config,
    Cancelled,
    Io,
    Internal,
}

impl ErrorKind {
    /// Stable snake-case identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Signature => "signature",
            Self::Integrity => "integrity",
            Self::Network => "network",
            Self::Http => "http",
            Self::Auth => "auth",
            Self::UnknownBoard => "unknown_board",
            Self::SessionExpired => "session_expired",
            Self::Protocol => "protocol",
            Self::DestinationBusy => "destination_busy",
            Self::Config => "config",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Reduce this error to its flat kind
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(NetworkError::HttpError { .. }) => ErrorKind::Http,
            Error::Network(_) => ErrorKind::Network,
            Error::Format(_) => ErrorKind::Format,
            Error::Signing(_) => ErrorKind::Signature,
            Error::Integrity(_) => ErrorKind::Integrity,
            Error::Recovery(err) => err.kind(),
            Error::Task(TaskError::DestinationBusy { .. }) => ErrorKind::DestinationBusy,
            Error::Task(_) | Error::Internal(_) => ErrorKind::Internal,
            Error::Config(_) => ErrorKind::Config,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether the retry policy may attempt the failed operation again.
    ///
    /// Only transient network failures qualify. Artifact problems (format,
    /// signature, integrity) are never retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(err) => err.is_transient(),
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Network(NetworkError::HttpError { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(ConfigError::ParseError {
            message: err.to_string(),
        })
    }
}

/// Result type alias for macfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for analytics / structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Network(err) => err.user_message(),
            Error::Recovery(err) => err.user_message(),
            Error::Io { message, .. } => Cow::Owned(message.clone()),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Network(err) => err.user_hint(),
            Error::Recovery(err) => err.user_hint(),
            Error::Config(err) => err.user_hint(),
            Error::Format(_) | Error::Integrity(_) => {
                Some("The downloaded artifact is corrupt; delete it and download again.")
            }
            Error::Signing(_) => {
                Some("The chunklist is not signed by a trusted key; do not use this image.")
            }
            Error::Task(TaskError::DestinationBusy { .. }) => {
                Some("Wait for the running download of this file to finish.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(err) => err.is_retryable(),
            Error::Recovery(err) => err.is_retryable(),
            Error::Task(TaskError::DestinationBusy { .. }) | Error::Io { .. } => true,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Network(err) => err.user_code(),
            Error::Format(_) => Some("chunklist.format"),
            Error::Signing(_) => Some("chunklist.signature"),
            Error::Integrity(_) => Some("chunklist.integrity"),
            Error::Recovery(err) => err.user_code(),
            Error::Task(_) => Some("task.error"),
            Error::Config(_) => Some("config.error"),
            Error::Internal(_) => Some("error.internal"),
            Error::Cancelled => Some("error.cancelled"),
            Error::Io { .. } => Some("error.io"),
        }
    }
}

// Serde helper module for io::ErrorKind as string
#[cfg(feature = "serde")]
mod io_kind_as_str {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(kind: &std::io::ErrorKind, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&format!("{kind:?}"))
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<std::io::ErrorKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Best effort mapping; default to Other
        Ok(match s.as_str() {
            "NotFound" => std::io::ErrorKind::NotFound,
            "PermissionDenied" => std::io::ErrorKind::PermissionDenied,
            "AlreadyExists" => std::io::ErrorKind::AlreadyExists,
            "InvalidInput" => std::io::ErrorKind::InvalidInput,
            "InvalidData" => std::io::ErrorKind::InvalidData,
            "TimedOut" => std::io::ErrorKind::TimedOut,
            "WriteZero" => std::io::ErrorKind::WriteZero,
            "Interrupted" => std::io::ErrorKind::Interrupted,
            "UnexpectedEof" => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        })
    }
}
