//! Primary sources and auxiliary resources.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::util::hash::is_sha256_hex;

/// Where the primary source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    /// Git checkout pinned to a revision
    Git {
        git: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    /// Archive download verified by checksum
    Archive {
        url: String,
        sha256: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strip_prefix: Option<String>,
    },
}

impl SourceSpec {
    /// URL of the source, for logs and receipts.
    pub fn url(&self) -> &str {
        match self {
            SourceSpec::Git { git, .. } => git,
            SourceSpec::Archive { url, .. } => url,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            SourceSpec::Archive { url, sha256, .. } => {
                validate_url(url)?;
                if !is_sha256_hex(sha256) {
                    return Err(format!("source sha256 `{}` is not a sha256 hex digest", sha256));
                }
            }
            SourceSpec::Git {
                git,
                tag,
                revision,
                branch,
            } => {
                validate_url(git)?;
                if tag.is_none() && revision.is_none() && branch.is_none() {
                    return Err(format!("git source {} needs a tag, revision or branch", git));
                }
            }
        }
        Ok(())
    }
}

/// Development-branch source used with `--head`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSpec {
    pub git: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl HeadSpec {
    pub fn to_source(&self) -> SourceSpec {
        SourceSpec::Git {
            git: self.git.clone(),
            tag: None,
            revision: None,
            branch: Some(self.branch.clone()),
        }
    }
}

/// An auxiliary download needed during the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Name referenced from templates (`{resource:NAME}`)
    pub name: String,

    pub url: String,

    /// Expected sha256 of the download
    pub sha256: String,

    /// Version of the bundled component, if meaningful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Buildpath-relative directory to unpack (or copy) into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_to: Option<String>,

    /// Leading directory to strip while unpacking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,
}

impl Resource {
    /// File name of the download, taken from the URL path.
    pub fn file_name(&self) -> String {
        download_file_name(&self.url)
    }

    /// Version of the component: declared, or guessed from the file name
    /// (`npm-10.9.2.tgz` yields `10.9.2`).
    pub fn component_version(&self) -> Option<String> {
        if let Some(ref v) = self.version {
            return Some(v.clone());
        }
        let file = self.file_name();
        let stem = archive_stem(&file);
        let (_, version) = stem.rsplit_once('-')?;
        version
            .chars()
            .next()
            .filter(|c| c.is_ascii_digit())
            .map(|_| version.to_string())
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("resource name is empty".to_string());
        }
        validate_url(&self.url).map_err(|e| format!("resource `{}`: {}", self.name, e))?;
        if !is_sha256_hex(&self.sha256) {
            return Err(format!(
                "resource `{}`: sha256 `{}` is not a sha256 hex digest",
                self.name, self.sha256
            ));
        }
        if let Some(ref dest) = self.stage_to {
            if dest.starts_with('/') || dest.split('/').any(|c| c == "..") {
                return Err(format!(
                    "resource `{}`: stage_to `{}` must stay inside the buildpath",
                    self.name, dest
                ));
            }
        }
        Ok(())
    }
}

fn validate_url(url: &str) -> Result<(), String> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| format!("invalid url `{}`: {}", url, e))
}

/// Last path segment of a URL, or a fixed name if it has none.
pub fn download_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(|s| s.to_string()))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

/// Strip archive extensions from a file name.
pub fn archive_stem(file: &str) -> &str {
    for ext in [".tar.gz", ".tar.xz", ".tar.bz2", ".tgz", ".txz", ".tar", ".zip"] {
        if let Some(stem) = file.strip_suffix(ext) {
            return stem;
        }
    }
    file
}
