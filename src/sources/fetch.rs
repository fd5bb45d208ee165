//! Downloading and verifying resources.
//!
//! Every download lands in `<cache>/downloads/<sha256 prefix>--<file name>`
//! and is only moved there once its digest matches. A mismatch deletes the
//! partial file and fails with an integrity error; there is no fallback
//! to another mirror.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;
use url::Url;

use crate::core::resource::{download_file_name, Resource, SourceSpec};
use crate::error::PipelineError;
use crate::sources::archive::{is_archive, unpack, Strip};
use crate::sources::git::GitCheckout;
use crate::util::fs::{ensure_dir, remove_path_if_exists};
use crate::util::hash::sha256_file;

/// A resource after fetching (and possibly staging).
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub resource: Resource,
    /// Verified download in the cache
    pub download: PathBuf,
    /// Where it was unpacked or copied, if `stage_to` was set
    pub staged: Option<PathBuf>,
}

/// Fetches and verifies downloads, caching them across runs.
pub struct ResourceFetcher {
    cache_dir: PathBuf,
    /// Downloads verified during this run, keyed by digest
    verified: HashMap<String, PathBuf>,
}

impl ResourceFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        ResourceFetcher {
            cache_dir: cache_dir.into(),
            verified: HashMap::new(),
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    /// Cache location for a download.
    pub fn cache_path(&self, url: &str, sha256: &str) -> PathBuf {
        let prefix = &sha256[..sha256.len().min(16)];
        self.downloads_dir()
            .join(format!("{}--{}", prefix, download_file_name(url)))
    }

    /// Fetch a resource, returning the verified download.
    pub fn fetch_resource(&mut self, resource: &Resource) -> Result<PathBuf> {
        self.fetch(&resource.name, &resource.url, &resource.sha256)
    }

    /// Fetch `url` and verify it against `sha256`.
    pub fn fetch(&mut self, name: &str, url: &str, sha256: &str) -> Result<PathBuf> {
        let expected = sha256.to_ascii_lowercase();
        if let Some(path) = self.verified.get(&expected) {
            tracing::debug!("{} already verified at {}", name, path.display());
            return Ok(path.clone());
        }

        let path = self.cache_path(url, &expected);
        if path.is_file() {
            if sha256_file(&path)? == expected {
                tracing::debug!("cache hit for {}: {}", name, path.display());
                self.verified.insert(expected, path.clone());
                return Ok(path);
            }
            tracing::warn!("cached {} is corrupt, downloading again", path.display());
            remove_path_if_exists(&path)?;
        }

        ensure_dir(&self.downloads_dir())?;
        let mut tmp = NamedTempFile::new_in(self.downloads_dir())
            .context("failed to create temporary download file")?;

        tracing::info!("Downloading {}", url);
        self.download(url, tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;

        let actual = sha256_file(tmp.path())?;
        if actual != expected {
            return Err(PipelineError::Integrity {
                resource: name.to_string(),
                url: url.to_string(),
                expected,
                actual,
            }
            .into());
        }

        tmp.persist(&path)
            .with_context(|| format!("failed to store download at {}", path.display()))?;
        tracing::debug!("verified {} ({})", name, &actual[..16]);
        self.verified.insert(expected, path.clone());
        Ok(path)
    }

    fn download(&self, url: &str, out: &mut std::fs::File) -> Result<()> {
        let parsed = Url::parse(url).with_context(|| format!("invalid url `{}`", url))?;
        match parsed.scheme() {
            "file" => {
                let source = parsed
                    .to_file_path()
                    .map_err(|_| anyhow::anyhow!("invalid file url `{}`", url))?;
                let mut file = std::fs::File::open(&source)
                    .with_context(|| format!("failed to open {}", source.display()))?;
                std::io::copy(&mut file, out)
                    .with_context(|| format!("failed to copy {}", source.display()))?;
            }
            "http" | "https" => {
                let client = reqwest::blocking::Client::builder()
                    .user_agent(concat!("keg/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .context("failed to build HTTP client")?;
                let mut response = client
                    .get(url)
                    .send()
                    .with_context(|| format!("failed to download {}", url))?;
                if !response.status().is_success() {
                    bail!("failed to download {}: HTTP {}", url, response.status());
                }
                response
                    .copy_to(out)
                    .with_context(|| format!("failed to read response body from {}", url))?;
            }
            other => bail!("unsupported url scheme `{}` in {}", other, url),
        }
        Ok(())
    }

    /// Fetch a resource and stage it into `buildpath` when it asks to be.
    pub fn fetch_and_stage(&mut self, resource: &Resource, buildpath: &Path) -> Result<FetchedResource> {
        let download = self.fetch_resource(resource)?;
        let staged = match resource.stage_to {
            Some(ref dir) => {
                let dest = buildpath.join(dir);
                stage_download(&download, &dest, resource.strip_prefix.as_deref())?;
                Some(dest)
            }
            None => None,
        };
        Ok(FetchedResource {
            resource: resource.clone(),
            download,
            staged,
        })
    }

    /// Download the primary archive ahead of the build; git sources are
    /// cloned later by [`stage_source`](Self::stage_source).
    pub fn prefetch_source(&mut self, name: &str, source: &SourceSpec) -> Result<Option<PathBuf>> {
        match source {
            SourceSpec::Archive { url, sha256, .. } => Ok(Some(self.fetch(name, url, sha256)?)),
            SourceSpec::Git { .. } => Ok(None),
        }
    }

    /// Place the primary source tree in `dest`.
    pub fn stage_source(&mut self, name: &str, source: &SourceSpec, dest: &Path) -> Result<()> {
        match source {
            SourceSpec::Archive {
                url,
                sha256,
                strip_prefix,
            } => {
                let download = self.fetch(name, url, sha256)?;
                unpack(&download, dest, &Strip::from_option(strip_prefix.as_deref()))
                    .with_context(|| format!("failed to unpack {}", download.display()))
            }
            SourceSpec::Git {
                git,
                tag,
                revision,
                branch,
            } => {
                let checkout = GitCheckout {
                    url: git,
                    tag: tag.as_deref(),
                    revision: revision.as_deref(),
                    branch: branch.as_deref(),
                };
                checkout.checkout(dest).map(|_| ())
            }
        }
    }
}

/// Unpack an archive into `dest`, or copy a plain file into it.
pub fn stage_download(download: &Path, dest: &Path, strip_prefix: Option<&str>) -> Result<()> {
    let file_name = download
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_archive(&file_name) {
        unpack(download, dest, &Strip::from_option(strip_prefix))
            .with_context(|| format!("failed to unpack {}", download.display()))
    } else {
        ensure_dir(dest)?;
        // drop the cache prefix from the file name
        let plain = file_name
            .split_once("--")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or(file_name);
        std::fs::copy(download, dest.join(&plain))
            .with_context(|| format!("failed to copy {} into {}", download.display(), dest.display()))?;
        Ok(())
    }
}
