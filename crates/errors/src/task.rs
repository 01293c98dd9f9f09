//! Task management error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskError {
    #[error("destination {path} is already owned by an active task")]
    DestinationBusy { path: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("task {id} not found")]
    NotFound { id: String },

    #[error("task {id} ended without reporting an outcome")]
    Abandoned { id: String },

    #[error("missing component: {component}")]
    MissingComponent { component: String },
}
