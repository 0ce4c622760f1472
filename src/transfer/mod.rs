//! Object storage transfers.
//!
//! The [`Transfer`] trait is the seam between the pipeline and whatever
//! moves bytes. `s3://` locators go through the AWS CLI; `file://` locators
//! and plain paths are copied locally. [`TransferRouter`] picks one by
//! scheme.

mod aws;
mod local;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use aws::{AwsCliTransfer, ProfileRule};
pub use local::LocalTransfer;

/// Which direction a transfer was going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Download,
    Upload,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => f.write_str("download"),
            Self::Upload => f.write_str("upload"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{phase} of {locator} exited with code {code}")]
    Failed {
        phase: TransferPhase,
        locator: String,
        code: i32,
        stderr: String,
    },
    #[error("{phase} of {locator}: no file at {}", .path.display())]
    Missing {
        phase: TransferPhase,
        locator: String,
        path: PathBuf,
    },
    #[error("{phase} of {locator}: file at {} is empty", .path.display())]
    Empty {
        phase: TransferPhase,
        locator: String,
        path: PathBuf,
    },
    #[error("{phase} of {locator}: {source}")]
    Io {
        phase: TransferPhase,
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{phase} of {locator}: {message}")]
    Launch {
        phase: TransferPhase,
        locator: String,
        message: String,
    },
}

impl TransferError {
    pub fn phase(&self) -> TransferPhase {
        match self {
            Self::Failed { phase, .. }
            | Self::Missing { phase, .. }
            | Self::Empty { phase, .. }
            | Self::Io { phase, .. }
            | Self::Launch { phase, .. } => *phase,
        }
    }

    /// Exit code to fold into classification. Only a tool failure carries a
    /// real code; everything else maps to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Failed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Moves files between object storage and the local filesystem.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Download `locator` into `local_dir`, returning the local path.
    async fn fetch(&self, locator: &str, local_dir: &Path) -> Result<PathBuf, TransferError>;

    /// Upload a file or directory to exactly `locator`.
    async fn put(&self, local: &Path, locator: &str) -> Result<(), TransferError>;
}

/// Last path component of a locator.
pub fn locator_basename(locator: &str) -> &str {
    locator
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(locator)
}

/// Join a child name onto a locator.
pub fn join_locator(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child)
}

/// Fetch and check that the result is a non-empty file.
pub async fn fetch_validated(
    transfer: &dyn Transfer,
    locator: &str,
    local_dir: &Path,
) -> Result<PathBuf, TransferError> {
    let path = transfer.fetch(locator, local_dir).await?;

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(_) => {
            return Err(TransferError::Missing {
                phase: TransferPhase::Download,
                locator: locator.to_string(),
                path,
            })
        }
    };

    if metadata.len() == 0 {
        warn!("Downloaded file is empty: {}", path.display());
        return Err(TransferError::Empty {
            phase: TransferPhase::Download,
            locator: locator.to_string(),
            path,
        });
    }

    Ok(path)
}

/// Dispatches by locator scheme.
pub struct TransferRouter {
    s3: AwsCliTransfer,
    local: LocalTransfer,
}

impl TransferRouter {
    pub fn new(s3: AwsCliTransfer) -> Self {
        Self {
            s3,
            local: LocalTransfer,
        }
    }

    fn backend(&self, locator: &str) -> &dyn Transfer {
        if locator.starts_with("s3://") {
            &self.s3
        } else {
            &self.local
        }
    }
}

#[async_trait]
impl Transfer for TransferRouter {
    async fn fetch(&self, locator: &str, local_dir: &Path) -> Result<PathBuf, TransferError> {
        self.backend(locator).fetch(locator, local_dir).await
    }

    async fn put(&self, local: &Path, locator: &str) -> Result<(), TransferError> {
        self.backend(locator).put(local, locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_helpers() {
        assert_eq!(locator_basename("s3://bucket/a/b.bam"), "b.bam");
        assert_eq!(locator_basename("s3://bucket/dir/"), "dir");
        assert_eq!(locator_basename("plain.bam"), "plain.bam");
        assert_eq!(join_locator("s3://b/out/", "job"), "s3://b/out/job");
    }

    #[test]
    fn test_exit_code_mapping() {
        let failed = TransferError::Failed {
            phase: TransferPhase::Download,
            locator: "s3://x".into(),
            code: 3,
            stderr: String::new(),
        };
        assert_eq!(failed.exit_code(), 3);
        assert_eq!(failed.phase(), TransferPhase::Download);

        let missing = TransferError::Missing {
            phase: TransferPhase::Download,
            locator: "s3://x".into(),
            path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(missing.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_fetch_validated_detects_empty_and_missing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let empty = src.path().join("empty.bam");
        std::fs::write(&empty, b"").unwrap();
        let full = src.path().join("full.bam");
        std::fs::write(&full, b"data").unwrap();

        let router = TransferRouter::new(AwsCliTransfer::default());

        let err = fetch_validated(&router, &empty.display().to_string(), dst.path())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Empty { .. }));

        let path = fetch_validated(&router, &full.display().to_string(), dst.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"data");

        let missing = src.path().join("nope.bam");
        assert!(fetch_validated(&router, &missing.display().to_string(), dst.path())
            .await
            .is_err());
    }
}
