//! Git checkouts of primary sources.

use std::path::Path;

use anyhow::{Context, Result};
use git2::{build::RepoBuilder, Oid, Repository, ResetType};

use crate::error::PipelineError;

/// What to check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCheckout<'a> {
    pub url: &'a str,
    pub tag: Option<&'a str>,
    pub revision: Option<&'a str>,
    pub branch: Option<&'a str>,
}

impl GitCheckout<'_> {
    /// Clone into `dest` and reset to the requested commit.
    ///
    /// When both a tag and a revision are given, the tag must point at the
    /// revision; a moved tag is treated like a checksum mismatch.
    /// Returns the checked-out commit id.
    pub fn checkout(&self, dest: &Path) -> Result<String> {
        tracing::info!("Cloning {}", self.url);

        let mut builder = RepoBuilder::new();
        if let Some(branch) = self.branch {
            builder.branch(branch);
        }
        let repo = builder
            .clone(self.url, dest)
            .with_context(|| format!("failed to clone {}", self.url))?;

        let commit = match (self.tag, self.revision) {
            (Some(tag), Some(rev)) => {
                let tagged = peel_tag(&repo, tag)?;
                if tagged.to_string() != rev {
                    return Err(PipelineError::Integrity {
                        resource: format!("tag {}", tag),
                        url: self.url.to_string(),
                        expected: rev.to_string(),
                        actual: tagged.to_string(),
                    }
                    .into());
                }
                tagged
            }
            (Some(tag), None) => peel_tag(&repo, tag)?,
            (None, Some(rev)) => Oid::from_str(rev).with_context(|| format!("invalid revision `{}`", rev))?,
            (None, None) => repo.head()?.peel_to_commit()?.id(),
        };

        let object = repo
            .find_commit(commit)
            .with_context(|| format!("commit {} not found in {}", commit, self.url))?;
        repo.reset(object.as_object(), ResetType::Hard, None)?;

        tracing::debug!("checked out {} at {}", self.url, commit);
        Ok(commit.to_string())
    }
}

fn peel_tag(repo: &Repository, tag: &str) -> Result<Oid> {
    let reference = repo
        .find_reference(&format!("refs/tags/{}", tag))
        .with_context(|| format!("tag `{}` not found", tag))?;
    Ok(reference.peel_to_commit()?.id())
}
