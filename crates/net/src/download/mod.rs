//! Resumable, retrying downloads for large payloads
//!
//! Payloads are streamed to disk in fixed increments. When a chunklist is
//! supplied, bytes are hashed as they arrive and a mismatching chunk stops
//! the transfer. Partial files left behind by cancellation or failure are
//! checked chunk by chunk before a transfer resumes from them.

mod config;
mod core;
mod registry;
mod resume;
mod stream;
mod validation;

pub use config::{
    DownloadOptions, DownloadProgress, DownloadTask, DownloaderConfig, ProgressCallback,
};
pub use core::RetryingDownloader;
pub use registry::{DestinationClaim, DestinationRegistry};
