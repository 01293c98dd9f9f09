#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Recovery session protocol for macfetch
//!
//! A recovery run acquires a short-lived session from the recovery server,
//! resolves a board id to a product, asks the server where the signed
//! image lives, and fetches the chunklist and the image through the shared
//! downloader. The image is verified against the chunklist as it streams.
//!
//! [`RecoverySessionClient`] holds the protocol state and enforces the
//! order of steps. The wire format sits behind [`RecoveryTransport`], with
//! [`HttpTransport`] as the real implementation.

mod client;
mod http;
mod query;
mod session;
mod transport;

pub use client::{RecoveryArtifacts, RecoverySessionClient, RecoveryState};
pub use http::HttpTransport;
pub use query::{random_hex, ImageInfo, ImageQuery};
pub use session::Session;
pub use transport::RecoveryTransport;
