use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Transfer lifecycle of a single URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started {
        url: String,
        total_bytes: Option<u64>,
        /// Offset the transfer starts from; non-zero when resuming
        resumed_from: u64,
    },

    /// A partial file was found and checked before resuming
    Resuming {
        url: String,
        verified_len: u64,
        on_disk: u64,
    },

    /// The partial file was discarded and the transfer starts over
    Restarted {
        url: String,
        reason: String,
    },

    Retrying {
        url: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        reason: String,
    },

    Progress {
        url: String,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    },

    Completed {
        url: String,
        bytes: u64,
        elapsed: Duration,
        verified: bool,
    },

    /// Stopped by cancellation; `bytes_on_disk` remain for a later resume
    Cancelled {
        url: String,
        bytes_on_disk: u64,
    },

    Failed {
        url: String,
        failure: FailureContext,
    },
}
