//! Product and board selection types

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use macfetch_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};

/// MLB serial sent when the caller does not supply one
pub const DEFAULT_MLB: &str = "00000000000000000";

/// Kind of image a product delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Recovery,
    Diagnostics,
    Installer,
}

impl ImageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Diagnostics => "diagnostics",
            Self::Installer => "installer",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recovery" => Ok(Self::Recovery),
            "diagnostics" => Ok(Self::Diagnostics),
            "installer" => Ok(Self::Installer),
            other => Err(ConfigError::InvalidValue {
                field: "image_type".to_string(),
                value: other.to_string(),
            }
            .into()),
        }
    }
}

/// Which recovery OS the server should hand out for a board
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    /// The OS the machine originally shipped with
    #[default]
    Default,
    /// The newest OS the machine supports
    Latest,
}

impl OsType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Latest => "latest",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable product and the boards it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub os_version: String,
    pub image_type: ImageType,
    #[serde(default)]
    pub board_ids: BTreeSet<String>,
}

impl Product {
    #[must_use]
    pub fn new(id: impl Into<String>, os_version: impl Into<String>, image_type: ImageType) -> Self {
        Self {
            id: id.into(),
            os_version: os_version.into(),
            image_type,
            board_ids: BTreeSet::new(),
        }
    }

    /// Add a compatible board id
    #[must_use]
    pub fn with_board(mut self, board_id: impl Into<String>) -> Self {
        self.board_ids.insert(board_id.into());
        self
    }

    #[must_use]
    pub fn supports(&self, board_id: &str) -> bool {
        self.board_ids.contains(board_id)
    }

    /// Relative directory `<id>/<os_version>/<image_type>` for this product
    #[must_use]
    pub fn relative_dir(&self) -> std::path::PathBuf {
        [self.id.as_str(), self.os_version.as_str(), self.image_type.as_str()]
            .iter()
            .collect()
    }
}

/// Caller input for a recovery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSelection {
    pub board_id: String,
    #[serde(default)]
    pub os_type: OsType,
    /// Logic board serial; [`DEFAULT_MLB`] when absent
    #[serde(default)]
    pub mlb: Option<String>,
    /// Client id override (16 hex digits); random when absent
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub diagnostics: bool,
    /// Accept a board id that is not in the registry
    #[serde(default)]
    pub manual_override: bool,
}

impl BoardSelection {
    #[must_use]
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            os_type: OsType::Default,
            mlb: None,
            client_id: None,
            diagnostics: false,
            manual_override: false,
        }
    }

    #[must_use]
    pub fn mlb(&self) -> &str {
        self.mlb.as_deref().unwrap_or(DEFAULT_MLB)
    }

    #[must_use]
    pub fn image_type(&self) -> ImageType {
        if self.diagnostics {
            ImageType::Diagnostics
        } else {
            ImageType::Recovery
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_dir_layout() {
        let product = Product::new("Mac-7BA5B2D9E42DDD94", "10.15", ImageType::Recovery);
        assert_eq!(
            product.relative_dir(),
            std::path::Path::new("Mac-7BA5B2D9E42DDD94/10.15/recovery")
        );
    }

    #[test]
    fn selection_defaults() {
        let sel = BoardSelection::new("Mac-937A206F2EE63C01");
        assert_eq!(sel.mlb(), DEFAULT_MLB);
        assert_eq!(sel.image_type(), ImageType::Recovery);
        assert_eq!(sel.os_type, OsType::Default);
    }

    #[test]
    fn image_type_parses() {
        assert_eq!("diagnostics".parse::<ImageType>().unwrap(), ImageType::Diagnostics);
        assert!("firmware".parse::<ImageType>().is_err());
    }
}
