//! Filesystem-to-filesystem transfers for `file://` locators and plain paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{locator_basename, Transfer, TransferError, TransferPhase};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransfer;

fn local_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}

/// Copy a directory tree, creating `dst` and any parents.
async fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let mut copied = 0;
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                stack.push((entry.path(), target));
            } else {
                copied += tokio::fs::copy(entry.path(), &target).await?;
            }
        }
    }

    Ok(copied)
}

#[async_trait]
impl Transfer for LocalTransfer {
    async fn fetch(&self, locator: &str, local_dir: &Path) -> Result<PathBuf, TransferError> {
        let src = local_path(locator);
        let dest = local_dir.join(locator_basename(locator));

        let bytes = tokio::fs::copy(&src, &dest)
            .await
            .map_err(|source| TransferError::Io {
                phase: TransferPhase::Download,
                locator: locator.to_string(),
                source,
            })?;

        info!("Copied {} bytes from {}", bytes, src.display());
        Ok(dest)
    }

    async fn put(&self, local: &Path, locator: &str) -> Result<(), TransferError> {
        let dest = local_path(locator);
        let io_err = |source| TransferError::Io {
            phase: TransferPhase::Upload,
            locator: locator.to_string(),
            source,
        };

        let metadata = tokio::fs::metadata(local).await.map_err(io_err)?;
        let bytes = if metadata.is_dir() {
            copy_tree(local, &dest).await.map_err(io_err)?
        } else {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            tokio::fs::copy(local, &dest).await.map_err(io_err)?
        };

        info!("Copied {} bytes to {}", bytes, dest.display());
        Ok(())
    }
}
