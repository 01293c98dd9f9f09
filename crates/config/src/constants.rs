//! Fixed protocol values
//!
//! These are part of the vendor protocol and are not exposed through
//! configuration.

/// Recovery server root
pub const RECOVERY_BASE_URL: &str = "http://osrecovery.apple.com/";

/// User agent the recovery server expects
pub const RECOVERY_USER_AGENT: &str = "InternetRecovery/1.0";

/// Image query endpoints, relative to the recovery server root
pub const RECOVERY_IMAGE_PATH: &str = "InstallationPayload/RecoveryImage";
pub const DIAGNOSTICS_IMAGE_PATH: &str = "InstallationPayload/Diagnostics";

/// User agent for payload transfers
pub const DOWNLOAD_USER_AGENT: &str = concat!("macfetch/", env!("CARGO_PKG_VERSION"));

/// Directory name under the platform config and download directories
pub const APP_DIR: &str = "macfetch";
