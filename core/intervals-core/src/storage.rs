//! Storage configuration and path management for Intervals.
//!
//! All on-disk locations are derived from one root so that tests (and mobile
//! hosts, which live in a sandbox) can inject their own directory.

use std::path::{Path, PathBuf};

use crate::error::{IntervalsError, Result};

/// File name of the persisted store blob. Mirrors the fixed namespace the
/// previous app generation used (`@intervals/store`).
pub const STORE_FILE_NAME: &str = "intervals-store.json";

/// Central configuration for all Intervals storage paths.
///
/// Desktop hosts use [`StorageConfig::from_home`] which points to `~/.intervals/`.
/// Tests and mobile hosts use [`StorageConfig::with_root`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves `~/.intervals`.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(IntervalsError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(".intervals"),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory for Intervals data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the single persisted store blob.
    pub fn store_file(&self) -> PathBuf {
        self.root.join(STORE_FILE_NAME)
    }

    /// Directory for rolling log files written by hosts.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<()> {
        fs_err::create_dir_all(&self.root).map_err(|source| IntervalsError::Io {
            context: format!("creating data directory {}", self.root.display()),
            source,
        })
    }
}
