//! On-disk shape of the board dataset

use macfetch_errors::{ConfigError, Error};
use macfetch_types::Product;
use serde::{Deserialize, Serialize};

/// Versioned list of products and the boards each one serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub version: u32,
    pub products: Vec<Product>,
}

impl Dataset {
    /// Parse a dataset from JSON
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| {
            ConfigError::ParseError {
                message: format!("invalid board dataset: {e}"),
            }
            .into()
        })
    }
}
