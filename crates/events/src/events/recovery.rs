use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Recovery session protocol steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryEvent {
    SessionAcquired {
        /// Seconds until the session expires
        expires_in: u64,
    },

    ProductResolved {
        board_id: String,
        product_id: String,
        os_version: String,
        /// The board was not in the registry and was accepted on request
        manual_override: bool,
    },

    ImageRequested {
        image_url: String,
        chunklist_url: String,
    },

    SessionExpired {
        restarting: bool,
    },

    Completed {
        image_path: String,
        chunklist_path: String,
    },

    Failed {
        state: String,
        failure: FailureContext,
    },
}
