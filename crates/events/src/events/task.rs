use macfetch_errors::{Error, ErrorKind};
use macfetch_types::TaskId;
use serde::{Deserialize, Serialize};

/// Terminal result of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    /// The payload was checked against a signed chunklist
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable context (destination path, HTTP status, chunk index)
    pub detail: String,
}

impl TaskOutcome {
    #[must_use]
    pub fn success(verified: bool) -> Self {
        Self {
            success: true,
            verified,
            error_kind: None,
            detail: String::new(),
        }
    }

    #[must_use]
    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            verified: false,
            error_kind: Some(kind),
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self::failure(error.kind(), error.to_string())
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Task manager progress and outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Started {
        task_id: TaskId,
        description: String,
    },

    Progress {
        task_id: TaskId,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    },

    Finished {
        task_id: TaskId,
        outcome: TaskOutcome,
    },
}
