#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Board identifier to product mapping for macfetch
//!
//! The registry is built once from a versioned JSON dataset and never
//! changes afterwards. The dataset compiled into the binary is reached
//! through [`BoardRegistry::builtin`]; a replacement dataset can be loaded
//! from a file and shared behind an `Arc`.

mod models;

pub use models::Dataset;

use macfetch_errors::{ConfigError, Error};
use macfetch_types::{ImageType, Product};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Dataset format version this build understands
pub const SUPPORTED_DATASET_VERSION: u32 = 1;

const BUILTIN_DATASET: &str = include_str!("../data/boards.json");

static BUILTIN: OnceLock<Result<BoardRegistry, Error>> = OnceLock::new();

/// Immutable board lookup table
#[derive(Debug, Clone)]
pub struct BoardRegistry {
    products: Vec<Product>,
    /// Board id to indices into `products`, in dataset order
    by_board: BTreeMap<String, Vec<usize>>,
}

impl BoardRegistry {
    /// The registry compiled into the binary, loaded on first use
    ///
    /// # Errors
    ///
    /// Returns the load error if the embedded dataset is invalid.
    pub fn builtin() -> Result<&'static Self, Error> {
        BUILTIN
            .get_or_init(|| Self::from_json(BUILTIN_DATASET))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Build a registry from dataset JSON
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for malformed JSON, an unsupported dataset
    /// version, or a board listed twice under the same product.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Self::from_dataset(Dataset::from_json(json)?)
    }

    /// Load a replacement dataset from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content fails
    /// [`BoardRegistry::from_json`].
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        let registry = Self::from_json(&json)?;
        tracing::debug!(
            path = %path.display(),
            products = registry.products.len(),
            boards = registry.by_board.len(),
            "loaded board dataset"
        );
        Ok(registry)
    }

    /// Validate a dataset and index it by board
    ///
    /// # Errors
    ///
    /// See [`BoardRegistry::from_json`].
    pub fn from_dataset(dataset: Dataset) -> Result<Self, Error> {
        if dataset.version != SUPPORTED_DATASET_VERSION {
            return Err(ConfigError::UnsupportedDatasetVersion {
                found: dataset.version,
                expected: SUPPORTED_DATASET_VERSION,
            }
            .into());
        }

        let mut seen = HashSet::new();
        let mut by_board: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, product) in dataset.products.iter().enumerate() {
            if product.id.is_empty() || product.os_version.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("product #{index} lacks an id or os_version"),
                }
                .into());
            }
            for board_id in &product.board_ids {
                let key = (
                    board_id.as_str(),
                    product.id.as_str(),
                    product.os_version.as_str(),
                    product.image_type,
                );
                if !seen.insert(key) {
                    return Err(ConfigError::Invalid {
                        message: format!(
                            "board {board_id} listed twice for {} {}",
                            product.id, product.os_version
                        ),
                    }
                    .into());
                }
                by_board.entry(board_id.clone()).or_default().push(index);
            }
        }

        Ok(Self {
            products: dataset.products,
            by_board,
        })
    }

    /// Primary product for a board: its first recovery product, or the
    /// first product of any type when it has no recovery image
    #[must_use]
    pub fn lookup(&self, board_id: &str) -> Option<&Product> {
        let mut products = self.products_for(board_id);
        products
            .clone()
            .find(|p| p.image_type == ImageType::Recovery)
            .or_else(|| products.next())
    }

    /// Every product serving a board, in dataset order
    pub fn products_for<'a>(&'a self, board_id: &str) -> impl Iterator<Item = &'a Product> + Clone {
        self.by_board
            .get(board_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&index| &self.products[index])
    }

    /// Product of a given image type for a board
    #[must_use]
    pub fn find(&self, board_id: &str, image_type: ImageType) -> Option<&Product> {
        self.products_for(board_id)
            .find(|p| p.image_type == image_type)
    }

    /// All known board ids, sorted
    pub fn boards(&self) -> impl Iterator<Item = &str> {
        self.by_board.keys().map(String::as_str)
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
