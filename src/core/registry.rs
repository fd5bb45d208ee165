//! Installed-package registry.
//!
//! The resolver only ever reads from a registry. A keg counts as installed
//! once its `INSTALL_RECEIPT.json` exists; the receipt is the last thing an
//! install writes, so a half-built prefix is never visible here.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::fs::{atomic_write, read_to_string};

/// File name of the install receipt inside a keg.
pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

/// An installed formula version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keg {
    pub name: String,
    /// Version including revision suffix
    pub version: String,
    /// `<cellar>/<name>/<version>`
    pub prefix: PathBuf,
    /// `<root>/opt/<name>`
    pub opt_prefix: PathBuf,
}

impl Keg {
    pub fn bin(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn lib(&self) -> PathBuf {
        self.prefix.join("lib")
    }

    pub fn include(&self) -> PathBuf {
        self.prefix.join("include")
    }

    pub fn libexec(&self) -> PathBuf {
        self.prefix.join("libexec")
    }

    pub fn share(&self) -> PathBuf {
        self.prefix.join("share")
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.prefix.join(RECEIPT_FILE)
    }

    /// Value of a `{dep:NAME.FIELD}` placeholder.
    pub fn field(&self, field: &str) -> Option<String> {
        let path = match field {
            "prefix" => self.prefix.clone(),
            "opt" => self.opt_prefix.clone(),
            "bin" => self.bin(),
            "lib" => self.lib(),
            "include" => self.include(),
            "libexec" => self.libexec(),
            "share" => self.share(),
            "opt_bin" => self.opt_prefix.join("bin"),
            "opt_lib" => self.opt_prefix.join("lib"),
            "opt_include" => self.opt_prefix.join("include"),
            "version" => return Some(self.version.clone()),
            _ => return None,
        };
        Some(path.display().to_string())
    }

    /// Read this keg's receipt.
    pub fn receipt(&self) -> Result<InstallReceipt> {
        InstallReceipt::load(&self.receipt_path())
    }
}

/// Metadata written into a keg after a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub revision: u32,
    /// Seconds since the epoch
    pub installed_at: u64,
    #[serde(default)]
    pub keg_only: bool,
    #[serde(default)]
    pub head: bool,
    #[serde(default)]
    pub source: Option<String>,
    /// Resolved run-time dependencies and their versions
    #[serde(default)]
    pub runtime_dependencies: BTreeMap<String, String>,
    /// Number of files in the keg
    pub file_count: usize,
    /// Digest over the sorted relative file list
    pub files_digest: String,
}

impl InstallReceipt {
    pub fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse receipt: {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        atomic_write(path, json.as_bytes())
    }
}

/// A source of installed packages.
pub trait PackageRegistry {
    /// Find the installed keg for `name`, if any.
    fn lookup(&self, name: &str) -> Result<Option<Keg>>;
}

/// Registry backed by a Cellar directory.
#[derive(Debug, Clone)]
pub struct Cellar {
    root: PathBuf,
}

impl Cellar {
    /// Cellar under the shared prefix `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Cellar { root: root.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join("Cellar")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.root.join("opt")
    }

    /// Keg location for a formula version, installed or not.
    pub fn keg_for(&self, name: &str, version: &str) -> Keg {
        Keg {
            name: name.to_string(),
            version: version.to_string(),
            prefix: self.path().join(name).join(version),
            opt_prefix: self.opt_dir().join(name),
        }
    }

    /// Every installed version of `name`, oldest first.
    pub fn installed_versions(&self, name: &str) -> Result<Vec<Keg>> {
        let rack = self.path().join(name);
        if !rack.is_dir() {
            return Ok(Vec::new());
        }

        let mut kegs = Vec::new();
        for entry in std::fs::read_dir(&rack)
            .with_context(|| format!("failed to read {}", rack.display()))?
        {
            let entry = entry?;
            let version = entry.file_name().to_string_lossy().into_owned();
            // kegs set aside during a reinstall
            if version.starts_with('.') {
                continue;
            }
            let keg = self.keg_for(name, &version);
            if keg.receipt_path().is_file() {
                kegs.push(keg);
            } else {
                tracing::debug!("ignoring {} (no install receipt)", keg.prefix.display());
            }
        }
        kegs.sort_by(|a, b| compare_keg_versions(&a.version, &b.version));
        Ok(kegs)
    }
}

impl PackageRegistry for Cellar {
    fn lookup(&self, name: &str) -> Result<Option<Keg>> {
        // the opt link names the active version
        let opt = self.opt_dir().join(name);
        if let Ok(target) = std::fs::canonicalize(&opt) {
            if let Some(version) = target.file_name().map(|v| v.to_string_lossy().into_owned()) {
                let keg = self.keg_for(name, &version);
                if keg.receipt_path().is_file() {
                    return Ok(Some(keg));
                }
            }
        }
        Ok(self.installed_versions(name)?.pop())
    }
}

/// Registry over a fixed set of kegs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    kegs: BTreeMap<String, Keg>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keg: Keg) {
        self.kegs.insert(keg.name.clone(), keg);
    }
}

impl PackageRegistry for InMemoryRegistry {
    fn lookup(&self, name: &str) -> Result<Option<Keg>> {
        Ok(self.kegs.get(name).cloned())
    }
}

/// Order keg directory names like `1.10.0_1` numerically where possible.
pub fn compare_keg_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.split(['.', '_', '-']).map(str::to_string).collect()
    };
    let (pa, pb) = (split(a), split(b));
    for (x, y) in pa.iter().zip(pb.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    pa.len().cmp(&pb.len())
}
