//! Requests accepted by the task manager and the reports they produce

use macfetch_types::{BoardSelection, ImageType, Product};
use serde::Serialize;
use std::path::PathBuf;

/// One logical operation
#[derive(Debug, Clone)]
pub enum TaskRequest {
    /// Fetch an installer payload from a known URL
    Installer(InstallerRequest),
    /// Run the recovery protocol for a board
    Recovery(RecoveryRequest),
}

impl TaskRequest {
    /// Short description used in events and logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Installer(request) => format!(
                "installer {} {} from {}",
                request.product.id, request.product.os_version, request.url
            ),
            Self::Recovery(request) => format!(
                "{} image for {} ({})",
                request.selection.image_type(),
                request.selection.board_id,
                request.selection.os_type
            ),
        }
    }
}

impl From<InstallerRequest> for TaskRequest {
    fn from(request: InstallerRequest) -> Self {
        Self::Installer(request)
    }
}

impl From<RecoveryRequest> for TaskRequest {
    fn from(request: RecoveryRequest) -> Self {
        Self::Recovery(request)
    }
}

/// Direct download of a product whose URLs are already known
#[derive(Debug, Clone)]
pub struct InstallerRequest {
    pub url: String,
    /// Chunklist authenticating the payload, if the product has one
    pub chunklist_url: Option<String>,
    pub product: Product,
    /// Overrides the file name taken from the URL
    pub file_name: Option<String>,
}

impl InstallerRequest {
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        product_id: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            chunklist_url: None,
            product: Product::new(product_id, os_version, ImageType::Installer),
            file_name: None,
        }
    }

    #[must_use]
    pub fn with_chunklist(mut self, url: impl Into<String>) -> Self {
        self.chunklist_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Recovery protocol run for one board
#[derive(Debug, Clone)]
pub struct RecoveryRequest {
    pub selection: BoardSelection,
}

impl RecoveryRequest {
    #[must_use]
    pub fn new(selection: BoardSelection) -> Self {
        Self { selection }
    }
}

/// What a successful task left on disk
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub product: Product,
    pub image_path: PathBuf,
    pub chunklist_path: Option<PathBuf>,
    pub bytes: u64,
    /// Every byte was checked against the chunklist
    pub verified: bool,
    /// Key that verified the chunklist signature
    pub key_id: Option<String>,
    /// Verified bytes reused from an earlier partial download
    pub resumed_from: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_name_the_target() {
        let installer = TaskRequest::from(InstallerRequest::new(
            "https://example.invalid/InstallAssistant.pkg",
            "012-34567",
            "14.6",
        ));
        assert_eq!(
            installer.describe(),
            "installer 012-34567 14.6 from https://example.invalid/InstallAssistant.pkg"
        );

        let mut selection = BoardSelection::new("Mac-937A206F2EE63C01");
        selection.diagnostics = true;
        let recovery = TaskRequest::from(RecoveryRequest::new(selection));
        assert_eq!(
            recovery.describe(),
            "diagnostics image for Mac-937A206F2EE63C01 (default)"
        );
    }
}
