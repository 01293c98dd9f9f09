//! Recovery session protocol error types

use std::borrow::Cow;

use crate::{ErrorKind, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryError {
    #[error("session rejected by server: {reason}")]
    Auth { reason: String },

    #[error("unknown board id: {board_id}")]
    UnknownBoard { board_id: String },

    #[error("recovery session expired")]
    SessionExpired,

    #[error("{operation} is not allowed in state {state}")]
    InvalidState { operation: String, state: String },

    #[error("malformed server response: {reason}")]
    MalformedResponse { reason: String },
}

impl RecoveryError {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::UnknownBoard { .. } => ErrorKind::UnknownBoard,
            Self::SessionExpired => ErrorKind::SessionExpired,
            Self::InvalidState { .. } | Self::MalformedResponse { .. } => ErrorKind::Protocol,
        }
    }
}

impl UserFacingError for RecoveryError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Auth { .. } => Some("The recovery server refused the session; retry later."),
            Self::UnknownBoard { .. } => {
                Some("Check the board id, or pass a manual override to use it anyway.")
            }
            Self::SessionExpired => Some("Start the recovery download again."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::Auth { .. } => "recovery.auth",
            Self::UnknownBoard { .. } => "recovery.unknown_board",
            Self::SessionExpired => "recovery.session_expired",
            Self::InvalidState { .. } => "recovery.invalid_state",
            Self::MalformedResponse { .. } => "recovery.malformed_response",
        })
    }
}
