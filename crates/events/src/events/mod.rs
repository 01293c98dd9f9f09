use serde::{Deserialize, Serialize};

use crate::EventSource;
use macfetch_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self {
            code: error.user_code().map(Into::into),
            message: error.user_message().into_owned(),
            hint: error.user_hint().map(Into::into),
            retryable: error.is_retryable(),
        }
    }
}

pub mod download;
pub mod general;
pub mod recovery;
pub mod task;
pub mod verification;

pub use download::DownloadEvent;
pub use general::GeneralEvent;
pub use recovery::RecoveryEvent;
pub use task::{TaskEvent, TaskOutcome};
pub use verification::VerificationEvent;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Transfer lifecycle of a single URL
    Download(DownloadEvent),

    /// Chunklist signature and payload checks
    Verification(VerificationEvent),

    /// Recovery session protocol steps
    Recovery(RecoveryEvent),

    /// Task manager progress and outcomes
    Task(TaskEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Download(_) => EventSource::DOWNLOAD,
            Self::Verification(_) => EventSource::VERIFICATION,
            Self::Recovery(_) => EventSource::RECOVERY,
            Self::Task(_) => EventSource::TASK,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Download(DownloadEvent::Failed { .. })
            | Self::Verification(VerificationEvent::Failed { .. })
            | Self::Recovery(RecoveryEvent::Failed { .. }) => Level::ERROR,

            Self::Task(TaskEvent::Finished { outcome, .. }) if !outcome.success => {
                if outcome.error_kind == Some(macfetch_errors::ErrorKind::Cancelled) {
                    Level::WARN
                } else {
                    Level::ERROR
                }
            }

            Self::General(GeneralEvent::Warning { .. })
            | Self::Download(DownloadEvent::Retrying { .. } | DownloadEvent::Restarted { .. })
            | Self::Recovery(RecoveryEvent::SessionExpired { .. })
            | Self::Download(DownloadEvent::Cancelled { .. }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Download(DownloadEvent::Progress { .. })
            | Self::Task(TaskEvent::Progress { .. })
            | Self::Verification(VerificationEvent::ChunkVerified { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "macfetch::events::general",
            Self::Download(_) => "macfetch::events::download",
            Self::Verification(_) => "macfetch::events::verification",
            Self::Recovery(_) => "macfetch::events::recovery",
            Self::Task(_) => "macfetch::events::task",
        }
    }
}
