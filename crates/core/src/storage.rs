//! Object storage abstraction for uploaded document bytes.
//!
//! Jobs carry a `source_locator` rather than the bytes themselves; the
//! worker resolves the locator through this trait when processing starts.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch the full byte payload for a locator.
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Locators resolved as paths relative to a fixed root directory.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locators may not escape the root.
    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        if relative
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::RootDir))
        {
            return Err(PipelineError::Storage(format!(
                "locator escapes the storage root: {locator}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        let bytes = tokio::fs::read(&path).await.map_err(|error| {
            PipelineError::Storage(format!("could not read {}: {error}", path.display()))
        })?;
        debug!(locator, byte_size = bytes.len(), "fetched object");
        Ok(bytes)
    }
}
