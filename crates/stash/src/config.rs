//! Stash configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `REMOTESTASH_PATH`: Base path for the stash directory
//!
//! Default path: `~/.remotestash`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the manifest file inside the stash directory.
pub const MANIFEST_FILE: &str = "contents.json";

/// Configuration for a stash directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashConfig {
    /// Directory holding the manifest and payload files.
    /// Created on first open.
    #[serde(default = "default_stash_path")]
    pub location: PathBuf,
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            location: default_stash_path(),
        }
    }
}

/// Get the default stash path (~/.remotestash).
fn default_stash_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".remotestash"))
        .unwrap_or_else(|| PathBuf::from(".remotestash"))
}

impl StashConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let location = env::var("REMOTESTASH_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_stash_path());

        Self { location }
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[stash]` section:
    /// ```toml
    /// [stash]
    /// location = "/home/me/.remotestash"
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        if let Some(section) = table.get("stash") {
            let config: StashConfig = section
                .clone()
                .try_into()
                .context("failed to parse [stash] section")?;
            Ok(config)
        } else {
            Ok(Self::from_env())
        }
    }

    /// Create a config with a specific stash directory.
    pub fn with_location(path: impl Into<PathBuf>) -> Self {
        Self {
            location: path.into(),
        }
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.location.join(MANIFEST_FILE)
    }
}
