//! In-process ownership of destination paths

use macfetch_errors::{Error, TaskError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Paths currently written by an active transfer
#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    claims: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DestinationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for the lifetime of the returned guard
    ///
    /// # Errors
    ///
    /// Returns `TaskError::DestinationBusy` when another task holds the path.
    pub fn claim(&self, path: &Path) -> Result<DestinationClaim, Error> {
        let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| Error::internal("destination registry poisoned"))?;
        if !claims.insert(key.clone()) {
            return Err(TaskError::DestinationBusy {
                path: key.display().to_string(),
            }
            .into());
        }
        Ok(DestinationClaim {
            path: key,
            claims: Arc::clone(&self.claims),
        })
    }

    #[must_use]
    pub fn is_claimed(&self, path: &Path) -> bool {
        let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        self.claims
            .lock()
            .map(|claims| claims.contains(&key))
            .unwrap_or(false)
    }
}

/// RAII guard releasing a destination claim on drop
#[derive(Debug)]
pub struct DestinationClaim {
    path: PathBuf,
    claims: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DestinationClaim {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DestinationClaim {
    fn drop(&mut self) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.remove(&self.path);
        }
    }
}
