//! Test utilities for Keg unit tests.
//!
//! A [`Sandbox`] is a throwaway shared prefix, cache and formula directory
//! under one temporary directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use keg::test_support::{Sandbox, fixtures};
//!
//! #[test]
//! fn test_example() {
//!     let sb = Sandbox::new();
//!     sb.install_fake_keg("zlib", "1.3.1");
//!     let path = sb.write_formula("app", &fixtures::formula("app", "1.0", ""));
//!     // load and install...
//! }
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use url::Url;

use crate::core::registry::{Cellar, InstallReceipt, Keg};
use crate::util::fs::{force_symlink, relative_path};
use crate::util::GlobalContext;

pub use fixtures::*;

/// Temporary keg installation.
pub struct Sandbox {
    tmp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create sandbox");
        for dir in ["root", "cache", "formulae", "work"] {
            std::fs::create_dir_all(tmp.path().join(dir)).expect("failed to create sandbox dir");
        }
        Sandbox { tmp }
    }

    /// Shared prefix.
    pub fn root(&self) -> PathBuf {
        self.tmp.path().join("root")
    }

    pub fn cache(&self) -> PathBuf {
        self.tmp.path().join("cache")
    }

    pub fn formulae(&self) -> PathBuf {
        self.tmp.path().join("formulae")
    }

    /// Scratch directory for test inputs.
    pub fn work(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    pub fn gctx(&self) -> GlobalContext {
        GlobalContext::with_paths(self.root(), self.cache()).expect("failed to create context")
    }

    pub fn cellar(&self) -> Cellar {
        Cellar::new(self.root())
    }

    /// Write a formula file and return its path.
    pub fn write_formula(&self, name: &str, content: &str) -> PathBuf {
        let path = self.formulae().join(format!("{}.toml", name));
        std::fs::write(&path, content).expect("failed to write formula");
        path
    }

    /// Write a scratch file under `work/`.
    pub fn write_work_file(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.work().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent");
        }
        std::fs::write(&path, contents).expect("failed to write work file");
        path
    }

    /// Create an installed keg with a receipt and opt link.
    pub fn install_fake_keg(&self, name: &str, version: &str) -> Keg {
        let keg = self.cellar().keg_for(name, version);
        for dir in [keg.bin(), keg.lib(), keg.include()] {
            std::fs::create_dir_all(dir).expect("failed to create keg dir");
        }
        InstallReceipt {
            name: name.to_string(),
            version: version.to_string(),
            revision: 0,
            installed_at: InstallReceipt::now(),
            keg_only: false,
            head: false,
            source: None,
            runtime_dependencies: BTreeMap::new(),
            file_count: 0,
            files_digest: String::new(),
        }
        .write(&keg.receipt_path())
        .expect("failed to write receipt");

        let opt = keg.opt_prefix.clone();
        let target = relative_path(opt.parent().unwrap_or(Path::new("/")), &keg.prefix);
        force_symlink(&target, &opt).expect("failed to link opt");
        keg
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}

/// Build a gzipped tarball from `(path, contents)` pairs. Every entry is
/// a regular file with mode 0755.
pub fn tarball_gz(entries: &[(&str, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("failed to append tar entry");
    }
    builder
        .into_inner()
        .and_then(|enc| enc.finish())
        .expect("failed to finish tarball")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::PackageRegistry;

    #[test]
    fn test_fake_keg_is_resolvable() {
        let sb = Sandbox::new();
        sb.install_fake_keg("zlib", "1.3.1");
        let keg = sb.cellar().lookup("zlib").unwrap().unwrap();
        assert_eq!(keg.version, "1.3.1");
        assert!(keg.opt_prefix.join("bin").is_dir());
    }
}
