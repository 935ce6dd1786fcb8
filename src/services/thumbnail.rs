//! Thumbnail storage
//!
//! Handlers register images under a thumbnail format, a path template with a
//! `{size}` placeholder. The local manager stores originals only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::db::ThumbnailFormatRecord;

/// Size segment used for the unscaled image
pub const ORIGINAL_SIZE: &str = "original";

#[async_trait]
pub trait ThumbnailManager: Send + Sync {
    /// Store `image` under `format`, returning where it ended up.
    async fn put_thumbnail(&self, format: &ThumbnailFormatRecord, image: &Path) -> Result<PathBuf>;
}

/// Writes thumbnails below a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalThumbnailManager {
    root: PathBuf,
}

impl LocalThumbnailManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Destination for a format rendered at `size`
    pub fn path_for(&self, format: &ThumbnailFormatRecord, size: &str) -> PathBuf {
        self.root.join(format.format.replace("{size}", size))
    }
}

#[async_trait]
impl ThumbnailManager for LocalThumbnailManager {
    async fn put_thumbnail(&self, format: &ThumbnailFormatRecord, image: &Path) -> Result<PathBuf> {
        let dest = self.path_for(format, ORIGINAL_SIZE);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create thumbnail directory {}", parent.display())
            })?;
        }

        tokio::fs::copy(image, &dest).await.with_context(|| {
            format!(
                "Failed to copy thumbnail {} to {}",
                image.display(),
                dest.display()
            )
        })?;

        info!(format = %format.format, path = %dest.display(), "Stored thumbnail");
        Ok(dest)
    }
}
