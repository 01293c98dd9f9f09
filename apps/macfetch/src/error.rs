//! CLI error handling

use std::fmt;

use macfetch_errors::{ErrorKind, UserFacingError};

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Operations error
    Ops(macfetch_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Flat kind reported alongside the message
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::Ops(e) => e.kind(),
            CliError::InvalidArguments(_) => ErrorKind::Config,
            CliError::Io(_) => ErrorKind::Io,
        }
    }

    /// Process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Config => 2,
            ErrorKind::Format | ErrorKind::Signature | ErrorKind::Integrity => 3,
            ErrorKind::Network | ErrorKind::Http => 4,
            ErrorKind::Auth | ErrorKind::SessionExpired | ErrorKind::Protocol => 5,
            ErrorKind::UnknownBoard => 6,
            ErrorKind::DestinationBusy => 7,
            ErrorKind::Cancelled => 130,
            ErrorKind::Io | ErrorKind::Internal => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<macfetch_errors::Error> for CliError {
    fn from(e: macfetch_errors::Error) -> Self {
        CliError::Ops(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macfetch_errors::{Error, IntegrityError, RecoveryError};

    #[test]
    fn exit_codes_follow_error_kind() {
        let integrity = CliError::from(Error::from(IntegrityError::ChunkMismatch {
            chunk_index: 4,
            offset: 4096,
        }));
        assert_eq!(integrity.exit_code(), 3);

        let board = CliError::from(Error::from(RecoveryError::UnknownBoard {
            board_id: "Mac-0".to_string(),
        }));
        assert_eq!(board.kind(), ErrorKind::UnknownBoard);
        assert_eq!(board.exit_code(), 6);

        assert_eq!(CliError::from(Error::Cancelled).exit_code(), 130);
    }
}
