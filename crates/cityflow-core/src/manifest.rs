//! Static manifest served to the dashboard.
//!
//! The file is re-read on every request so it can be replaced without a restart.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Errors reading the manifest file.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The file does not exist.
    #[error("Manifest file not found")]
    NotFound(PathBuf),

    /// The file is not valid JSON.
    #[error("Manifest JSON format error")]
    InvalidJson(String),

    /// The file exists but could not be read.
    #[error("Manifest read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads the manifest JSON from a fixed path.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Creates a store for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The manifest path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the manifest.
    pub async fn load(&self) -> Result<Value, ManifestError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Manifest file not found");
                return Err(ManifestError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(ManifestError::Io(e)),
        };

        serde_json::from_str(&raw).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Manifest is not valid JSON");
            ManifestError::InvalidJson(e.to_string())
        })
    }
}
