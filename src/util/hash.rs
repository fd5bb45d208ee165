//! Checksums for downloads and installed kegs.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hex sha256 of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex sha256 of a file, streamed from disk.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read {} while hashing", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether `s` looks like a sha256 digest (64 hex characters).
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Digest over the contents of a keg.
///
/// Every entry contributes its relative path and either the sha256 of its
/// contents or, for a symlink, its target. Entries must be added in a
/// stable order.
#[derive(Default)]
pub struct KegDigest {
    hasher: Sha256,
}

impl KegDigest {
    pub fn new() -> Self {
        KegDigest::default()
    }

    /// Add `root/relative`.
    pub fn add(&mut self, root: &Path, relative: &Path) -> Result<()> {
        let path = root.join(relative);
        let meta = std::fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;

        let content = if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path)?;
            format!("-> {}", target.display())
        } else if meta.is_file() {
            sha256_file(&path)?
        } else {
            String::new()
        };

        self.hasher.update(relative.to_string_lossy().as_bytes());
        self.hasher.update(b"\0");
        self.hasher.update(content.as_bytes());
        self.hasher.update(b"\n");
        Ok(())
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
