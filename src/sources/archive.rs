//! Archive unpacking.
//!
//! Gzipped tarballs are unpacked in-process; everything else (xz, bzip2,
//! zip) goes through the system `tar`, which handles them on every
//! platform keg supports.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tempfile::TempDir;

use crate::util::fs::{ensure_dir, remove_path_if_exists, symlink};
use crate::util::process::ProcessBuilder;

/// How much of the archive's directory structure to drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strip {
    /// Keep every entry as-is
    Nothing,
    /// Drop this leading directory
    Prefix(String),
    /// Drop the top-level directory if it is the only entry
    SingleRoot,
}

impl Strip {
    pub fn from_option(prefix: Option<&str>) -> Self {
        match prefix {
            Some(p) => Strip::Prefix(p.to_string()),
            None => Strip::SingleRoot,
        }
    }
}

/// Whether a file name looks like an archive keg knows how to unpack.
pub fn is_archive(name: &str) -> bool {
    [
        ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz", ".tar", ".zip",
    ]
    .iter()
    .any(|ext| name.ends_with(ext))
}

fn is_gzip_tar(name: &str) -> bool {
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Unpack `archive` into `dest`, merging with whatever is already there.
pub fn unpack(archive: &Path, dest: &Path, strip: &Strip) -> Result<()> {
    ensure_dir(dest)?;
    let parent = dest
        .parent()
        .ok_or_else(|| anyhow::anyhow!("cannot unpack into {}", dest.display()))?;
    let staging = TempDir::new_in(parent)
        .with_context(|| format!("failed to create staging directory in {}", parent.display()))?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_gzip_tar(&name) {
        let file = std::fs::File::open(archive)
            .with_context(|| format!("failed to open {}", archive.display()))?;
        extract_tarball(BufReader::new(file), staging.path(), None)
            .with_context(|| format!("failed to extract {}", archive.display()))?;
    } else {
        let output = ProcessBuilder::new("tar")
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(staging.path())
            .exec()?;
        if !output.status.success() {
            bail!(
                "tar failed to extract {}:\n{}",
                archive.display(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }

    let root = match strip {
        Strip::Nothing => staging.path().to_path_buf(),
        Strip::Prefix(prefix) => {
            let root = staging.path().join(prefix.trim_end_matches('/'));
            if !root.is_dir() {
                bail!("{} has no top-level directory `{}`", archive.display(), prefix);
            }
            root
        }
        Strip::SingleRoot => single_root(staging.path())?.unwrap_or_else(|| staging.path().to_path_buf()),
    };

    move_children(&root, dest)
}

/// The only entry of `dir`, if it is a directory.
fn single_root(dir: &Path) -> Result<Option<PathBuf>> {
    let entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(Some(only.path())),
        _ => Ok(None),
    }
}

/// Move every child of `from` into `to`, merging directories.
fn move_children(from: &Path, to: &Path) -> Result<()> {
    ensure_dir(to)?;
    for entry in std::fs::read_dir(from).with_context(|| format!("failed to read {}", from.display()))? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        let is_dir = entry.file_type()?.is_dir();

        if is_dir && target.is_dir() && !target.is_symlink() {
            move_children(&entry.path(), &target)?;
            continue;
        }
        remove_path_if_exists(&target)?;
        std::fs::rename(entry.path(), &target).with_context(|| {
            format!("failed to move {} to {}", entry.path().display(), target.display())
        })?;
    }
    Ok(())
}

/// Extract a gzipped tarball, streaming it from `reader`.
///
/// Entries that would land outside `dest` are rejected.
pub fn extract_tarball(reader: impl Read, dest: &Path, strip_prefix: Option<&str>) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let decoder = GzDecoder::new(reader);
    let mut archive = Archive::new(decoder);
    archive.set_preserve_permissions(true);

    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create destination directory: {}", dest.display()))?;

    let strip = |path: &str| -> Option<String> {
        let path = path.replace('\\', "/");
        let relative = match strip_prefix.map(|p| p.trim_end_matches('/')) {
            Some(prefix) if path.trim_end_matches('/') == prefix => return None,
            Some(prefix) => path
                .strip_prefix(&format!("{}/", prefix))
                .map(str::to_string)
                .unwrap_or(path),
            None => path,
        };
        (!relative.is_empty()).then_some(relative)
    };

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path_str = entry
            .path()
            .context("failed to get entry path")?
            .to_string_lossy()
            .into_owned();

        let Some(relative) = strip(&entry_path_str) else {
            continue;
        };
        if Path::new(&relative).is_absolute() || relative.split('/').any(|c| c == "..") {
            bail!("tarball entry escapes destination directory: {}", entry_path_str);
        }

        let output_path = dest.join(&relative);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&output_path).with_context(|| {
                    format!("failed to create directory: {}", output_path.display())
                })?;
            }
            tar::EntryType::Symlink => {
                if let Some(target) = entry.link_name()? {
                    remove_path_if_exists(&output_path)?;
                    symlink(&target, &output_path).with_context(|| {
                        format!("failed to create symlink: {}", output_path.display())
                    })?;
                }
            }
            tar::EntryType::Link => {
                let source = entry
                    .link_name()?
                    .and_then(|target| strip(&target.to_string_lossy()))
                    .map(|target| dest.join(target))
                    .ok_or_else(|| anyhow::anyhow!("hard link without target: {}", entry_path_str))?;
                remove_path_if_exists(&output_path)?;
                if std::fs::hard_link(&source, &output_path).is_err() {
                    std::fs::copy(&source, &output_path).with_context(|| {
                        format!("failed to extract hard link: {}", output_path.display())
                    })?;
                }
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            other => {
                tracing::debug!("skipping tar entry {} of type {:?}", entry_path_str, other);
            }
        }
    }

    Ok(())
}
