#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! High-level operations for macfetch
//!
//! The [`TaskManager`] is the surface front ends talk to: it starts each
//! installer download or recovery run as its own task, bounds how many
//! transfer at once, and reports progress and terminal outcomes on the
//! event bus. Callers that prefer awaiting can use [`TaskHandle::wait`].

mod context;
mod installer;
mod manager;
mod recovery;
mod types;
mod verify;

pub use context::{OpsContextBuilder, OpsCtx};
pub use manager::{TaskHandle, TaskManager};
pub use types::{InstallerRequest, RecoveryRequest, TaskReport, TaskRequest};
pub use verify::verify_download;

pub use macfetch_chunklist::FileReport;
