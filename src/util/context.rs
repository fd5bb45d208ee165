//! Global context for Keg operations.
//!
//! Provides centralized access to configuration, paths, and environment.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── Cellar/<name>/<version>/   # one keg per installed formula version
//! ├── opt/<name> -> ../Cellar/<name>/<version>
//! ├── bin/                       # links into non keg-only kegs
//! ├── lib/
//! └── share/
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::util::config::Config;

/// Project directories for Keg
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("com", "keg", "keg"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Shared prefix
    root: PathBuf,

    /// Download cache
    cache: PathBuf,

    /// Directory holding config.toml
    config_dir: PathBuf,

    /// Loaded configuration
    config: Config,

    /// Formula directories given on the command line
    extra_formula_dirs: Vec<PathBuf>,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext from the user's configuration.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let (config_dir, data_dir, cache_dir) = match PROJECT_DIRS.as_ref() {
            Some(dirs) => (
                dirs.config_dir().to_path_buf(),
                dirs.data_dir().to_path_buf(),
                dirs.cache_dir().to_path_buf(),
            ),
            None => {
                let fallback = cwd.join(".keg");
                (fallback.clone(), fallback.clone(), fallback.join("cache"))
            }
        };

        let config = Config::load_or_default(&config_dir.join("config.toml"));

        let root = config.paths.root.clone().unwrap_or(data_dir);
        let cache = config.paths.cache.clone().unwrap_or(cache_dir);

        Ok(GlobalContext {
            cwd,
            root,
            cache,
            config_dir,
            config,
            extra_formula_dirs: Vec::new(),
            verbose: false,
        })
    }

    /// Create a context rooted at explicit directories, without reading
    /// any configuration file.
    pub fn with_paths(root: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(GlobalContext {
            cwd,
            config_dir: root.join("etc").join("keg"),
            root,
            cache: cache.into(),
            config: Config::default(),
            extra_formula_dirs: Vec::new(),
            verbose: false,
        })
    }

    /// Override the shared prefix.
    pub fn set_root(&mut self, root: PathBuf) {
        self.root = root;
    }

    /// Override the download cache.
    pub fn set_cache(&mut self, cache: PathBuf) {
        self.cache = cache;
    }

    /// Search `dir` for formulae before the configured directories.
    pub fn add_formula_dir(&mut self, dir: PathBuf) {
        self.extra_formula_dirs.push(dir);
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the shared prefix.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the Cellar directory holding all kegs.
    pub fn cellar(&self) -> PathBuf {
        self.root.join("Cellar")
    }

    /// Get the `opt` directory holding stable keg links.
    pub fn opt_dir(&self) -> PathBuf {
        self.root.join("opt")
    }

    /// Get the download cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache
    }

    /// Get the directory used for temporary build trees.
    pub fn build_dir(&self) -> PathBuf {
        self.cache.join("build")
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Formula search directories: command-line ones, configured taps,
    /// then `./formulae`.
    pub fn formula_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.extra_formula_dirs.clone();
        dirs.extend(self.config.formula_dirs.iter().cloned());
        dirs.push(self.cwd.join("formulae"));
        dirs
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
