//! Configuration file support for Keg.
//!
//! The configuration lives in `config.toml` under the user configuration
//! directory (see [`GlobalContext::config_path`]). Every setting is
//! optional; command-line flags take precedence over the file.
//!
//! ```toml
//! formula_dirs = ["/usr/local/share/keg/formulae"]
//!
//! [paths]
//! root = "/opt/keg"
//! cache = "/var/cache/keg"
//!
//! [build]
//! jobs = 8
//! keep_failed = false
//!
//! [platform]
//! os_version = "14.4"
//! clang_build = 1500
//! case_insensitive_fs = true
//! ```
//!
//! [`GlobalContext::config_path`]: crate::util::GlobalContext::config_path

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Keg configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra directories searched for formula files
    pub formula_dirs: Vec<PathBuf>,

    /// Filesystem locations
    pub paths: PathsConfig,

    /// Build settings
    pub build: BuildConfig,

    /// Platform detection overrides
    pub platform: PlatformOverrides,
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Shared prefix; kegs live in `<root>/Cellar`
    pub root: Option<PathBuf>,

    /// Download cache directory
    pub cache: Option<PathBuf>,
}

/// Build settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel jobs passed to `make`
    pub jobs: Option<usize>,

    /// Keep the keg and build directory around after a failure
    pub keep_failed: bool,
}

/// Values that override host platform detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformOverrides {
    /// Operating system version, e.g. "14.4"
    pub os_version: Option<String>,

    /// Apple clang build number, e.g. 1500
    pub clang_build: Option<u32>,

    /// Compiler family, e.g. "clang" or "gcc"
    pub compiler: Option<String>,

    /// Treat the build filesystem as case-insensitive
    pub case_insensitive_fs: Option<bool>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }
}
