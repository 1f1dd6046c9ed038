//! Storage configuration for HealthQuery
//!
//! Resolves where the two storage tiers live on disk: the SQLite
//! conversation index and the sled message store both sit under one
//! data directory.

use crate::error::{HealthqueryError, Result};
use anyhow::Context;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
///
/// This makes it easy to point the engine at a test directory or alternate
/// location without changing the user's application data dir.
pub const DATA_DIR_ENV: &str = "HEALTHQUERY_DATA_DIR";

/// Location of the durable conversation stores
#[derive(Debug, Clone)]
pub struct StorageConfig {
    data_dir: PathBuf,
}

impl StorageConfig {
    /// Resolve the data directory from the environment or platform defaults
    ///
    /// Checks `HEALTHQUERY_DATA_DIR` first, then falls back to the
    /// platform-specific application data directory.
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Config` if no data directory can be
    /// determined.
    pub fn resolve() -> Result<Self> {
        if let Ok(override_dir) = std::env::var(DATA_DIR_ENV) {
            return Ok(Self::at(override_dir));
        }

        let proj_dirs = ProjectDirs::from("org", "healthquery", "healthquery")
            .ok_or_else(|| HealthqueryError::Config("Could not determine data directory".into()))?;

        Ok(Self::at(proj_dirs.data_dir()))
    }

    /// Create a configuration rooted at an explicit directory
    ///
    /// This is primarily useful for tests where the default application data
    /// directory is not desirable (for example, using a temporary directory).
    ///
    /// # Examples
    ///
    /// ```
    /// use healthquery::config::StorageConfig;
    ///
    /// let config = StorageConfig::at("/tmp/healthquery-test");
    /// assert!(config.index_path().ends_with("conversations.db"));
    /// ```
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The root data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the SQLite conversation index database
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("conversations.db")
    }

    /// Path of the sled message store directory
    pub fn messages_path(&self) -> PathBuf {
        self.data_dir.join("messages")
    }

    /// Create the data directory if it does not exist yet
    pub(crate) fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .context("Failed to create data directory")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;
        Ok(())
    }
}
