//! Byte retrieval from the content store.
//!
//! The engine treats the transport as opaque: success yields bytes, failure
//! is `Unauthorized` or `NotFound` and is never reinterpreted. [`FsDownloader`]
//! is the filesystem-backed implementation used by the CLI and tests.

use crate::error::{AppError, Result};
use std::path::{Component, Path, PathBuf};

/// Fetches the raw bytes behind a resolved content path.
pub trait Downloader: Send + Sync {
    /// Download the file at a resolved, section-prefixed relative path.
    fn fetch_bytes(&self, resolved_path: &str) -> Result<Vec<u8>>;
}

/// Downloader serving content from a local directory root.
pub struct FsDownloader {
    root: PathBuf,
}

impl FsDownloader {
    /// Create a downloader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Downloader for FsDownloader {
    fn fetch_bytes(&self, resolved_path: &str) -> Result<Vec<u8>> {
        let relative = Path::new(resolved_path);
        // Paths escaping the content root are refused, not resolved.
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(AppError::Unauthorized);
        }

        let full = self.root.join(relative);
        match std::fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(resolved_path.to_string()))
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }
}
