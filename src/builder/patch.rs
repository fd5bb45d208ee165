//! Applying source patches.
//!
//! Patch targets are relative to the buildpath (or the patch's `dir`) and
//! patch bodies are used verbatim, without placeholder expansion. Every
//! edit either changes the tree or fails, except `delete` of a file that
//! is already gone.

use std::path::{Path, PathBuf};

use anyhow::Result;
use regex::Regex;

use crate::builder::context::BuildContext;
use crate::core::patch::{Patch, PatchEdit};
use crate::error::PipelineError;
use crate::util::fs::{read_to_string, remove_path_if_exists, write_string};
use crate::util::process::ProcessBuilder;

/// Applies patches inside a build context.
pub struct PatchApplier<'a> {
    ctx: &'a BuildContext,
}

fn patch_error(path: &Path, reason: impl Into<String>) -> anyhow::Error {
    PipelineError::Patch {
        path: path.to_path_buf(),
        reason: reason.into(),
        output: String::new(),
    }
    .into()
}

impl<'a> PatchApplier<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        PatchApplier { ctx }
    }

    /// Apply `patches` in declaration order.
    pub fn apply_all(&self, patches: &[Patch]) -> Result<()> {
        for patch in patches {
            self.apply(patch)?;
        }
        Ok(())
    }

    fn base_dir(&self, patch: &Patch) -> PathBuf {
        match patch.dir {
            Some(ref dir) => self.ctx.layout.buildpath.join(dir),
            None => self.ctx.layout.buildpath.clone(),
        }
    }

    pub fn apply(&self, patch: &Patch) -> Result<()> {
        let base = self.base_dir(patch);
        let path = base.join(&patch.file);
        tracing::debug!("patching: {}", patch.describe());

        match &patch.edit {
            PatchEdit::Replace { from, to } => {
                let content = read_target(&path)?;
                if !content.contains(from.as_str()) {
                    return Err(patch_error(&path, format!("`{}` not found", from)));
                }
                write_string(&path, &content.replace(from.as_str(), to))?;
            }
            PatchEdit::Regex { pattern, to } => {
                let re = Regex::new(&format!("(?m){}", pattern))
                    .map_err(|e| patch_error(&path, format!("invalid regex: {}", e)))?;
                let content = read_target(&path)?;
                if !re.is_match(&content) {
                    return Err(patch_error(&path, format!("pattern `{}` matched nothing", pattern)));
                }
                write_string(&path, &re.replace_all(&content, to.as_str()))?;
            }
            PatchEdit::Write { contents } => write_string(&path, contents)?,
            PatchEdit::Delete => {
                if !remove_path_if_exists(&path)? {
                    tracing::info!("{} already absent, nothing to delete", path.display());
                }
            }
            PatchEdit::Diff {
                contents,
                resource,
                strip,
            } => {
                let diff = match (contents, resource) {
                    (Some(text), _) => text.clone(),
                    (None, Some(name)) => {
                        let fetched = self.ctx.resources.get(name).ok_or_else(|| {
                            patch_error(&base, format!("unknown patch resource `{}`", name))
                        })?;
                        read_to_string(&fetched.download)?
                    }
                    (None, None) => return Err(patch_error(&base, "diff has no contents")),
                };
                apply_diff(&base, &diff, *strip)?;
            }
        }
        Ok(())
    }
}

fn read_target(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(patch_error(path, "file not found"));
    }
    read_to_string(path)
}

/// Apply a unified diff with `git apply`, checking it first so a diff that
/// does not apply leaves the tree untouched.
fn apply_diff(dir: &Path, diff: &str, strip: u32) -> Result<()> {
    let strip_arg = format!("-p{}", strip);
    // keep git from treating an enclosing checkout as the repository
    let ceiling = dir.parent().unwrap_or(dir).display().to_string();

    for check in [true, false] {
        let mut pb = ProcessBuilder::new("git")
            .arg("apply")
            .arg(&strip_arg)
            .cwd(dir)
            .env("GIT_CEILING_DIRECTORIES", &ceiling)
            .stdin(diff.as_bytes().to_vec());
        if check {
            pb = pb.arg("--check");
        }
        let output = pb.exec().map_err(|e| patch_error(dir, format!("{:#}", e)))?;
        if !output.status.success() {
            return Err(PipelineError::Patch {
                path: dir.to_path_buf(),
                reason: "diff does not apply".to_string(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
    }
    Ok(())
}
