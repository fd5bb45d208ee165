//! Install actions.
//!
//! Actions run in declaration order against the build context. Relative
//! paths resolve against the buildpath; everything written into the keg
//! comes from a build output or from one of these actions.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::builder::bootstrap::Bootstrapper;
use crate::builder::context::BuildContext;
use crate::core::action::{CompletionShell, InstallAction};
use crate::sources::archive::{unpack, Strip};
use crate::util::fs::{
    atomic_write, copy_path, ensure_dir, force_symlink, glob_paths, is_inside, relative_path,
    remove_path_if_exists, set_executable,
};

/// A path an install action created or relinked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPath {
    pub path: PathBuf,
    /// Target of the symlink that was replaced
    pub replaced_link: Option<PathBuf>,
}

impl CreatedPath {
    /// Inspect `path` before it is written. An existing file or directory
    /// was not created by us and yields `None`.
    pub fn before_write(path: &Path) -> Option<Self> {
        match std::fs::symlink_metadata(path) {
            Err(_) => Some(CreatedPath {
                path: path.to_path_buf(),
                replaced_link: None,
            }),
            Ok(meta) if meta.file_type().is_symlink() => Some(CreatedPath {
                path: path.to_path_buf(),
                replaced_link: std::fs::read_link(path).ok(),
            }),
            Ok(_) => None,
        }
    }

    /// Remove the path, or point a replaced symlink back at its old target.
    pub fn undo(&self) -> Result<()> {
        match self.replaced_link {
            Some(ref target) => force_symlink(target, &self.path),
            None => remove_path_if_exists(&self.path).map(|_| ()),
        }
    }
}

/// Runs install and post-install actions.
pub struct Installer<'a> {
    ctx: &'a BuildContext,
    created: RefCell<Vec<CreatedPath>>,
}

impl<'a> Installer<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Installer {
            ctx,
            created: RefCell::new(Vec::new()),
        }
    }

    /// Paths created since the last call, oldest first.
    pub fn take_created(&self) -> Vec<CreatedPath> {
        self.created.take()
    }

    // Called before `path` is written. Records the outermost directory
    // that does not exist yet, since writes create missing parents.
    fn record(&self, path: &Path) {
        let mut top = path;
        while let Some(parent) = top.parent() {
            if parent.as_os_str().is_empty() || std::fs::symlink_metadata(parent).is_ok() {
                break;
            }
            top = parent;
        }
        if let Some(created) = CreatedPath::before_write(top) {
            self.created.borrow_mut().push(created);
        }
    }

    pub fn run(&self, actions: &[InstallAction]) -> Result<()> {
        for action in actions {
            tracing::debug!("install action: {}", action.kind());
            self.apply(action)
                .with_context(|| format!("`{}` install action failed", action.kind()))?;
        }
        Ok(())
    }

    pub fn apply(&self, action: &InstallAction) -> Result<()> {
        let ctx = self.ctx;
        match action {
            InstallAction::Copy { from, to } => {
                let to_str = ctx.expand(to)?;
                let sources = matching(&ctx.expand_path(from)?)?;
                let dest = ctx.resolve_path(&to_str);
                let into_dir = sources.len() > 1 || to_str.ends_with('/') || dest.is_dir();
                for src in sources {
                    let target = if into_dir {
                        dest.join(file_name(&src)?)
                    } else {
                        dest.clone()
                    };
                    self.record(&target);
                    copy_path(&src, &target)?;
                }
            }
            InstallAction::Mkdir { path } => {
                let path = ctx.expand_path(path)?;
                self.record(&path);
                ensure_dir(&path)?;
            }
            InstallAction::Remove { path } => {
                let path = ctx.expand_path(path)?;
                if !remove_path_if_exists(&path)? {
                    tracing::debug!("{} already absent", path.display());
                }
            }
            InstallAction::Symlink { target, link } => {
                let link = ctx.expand_path(link)?;
                let target = PathBuf::from(ctx.expand(target)?);
                self.record(&link);
                link_into(&target, &link, &ctx.layout.prefix)?;
            }
            InstallAction::Write {
                path,
                contents,
                executable,
            } => {
                let path = ctx.expand_path(path)?;
                let contents = ctx.expand(contents)?;
                self.record(&path);
                atomic_write(&path, contents.as_bytes())?;
                if *executable {
                    set_executable(&path)?;
                }
            }
            InstallAction::Extract { archive, into } => {
                let pattern = ctx.expand_path(archive)?;
                let archive = matching(&pattern)?.into_iter().next().ok_or_else(|| {
                    anyhow::anyhow!("no archive matches {}", pattern.display())
                })?;
                let into = ctx.expand_path(into)?;
                self.record(&into);
                unpack(&archive, &into, &Strip::Nothing)
                    .with_context(|| format!("failed to extract {}", archive.display()))?;
            }
            InstallAction::EnvScript { path, target, env } => {
                let path = ctx.expand_path(path)?;
                let target = ctx.expand_path(target)?;
                let mut vars = Vec::new();
                for (key, value) in env {
                    vars.push((key.as_str(), ctx.expand(value)?));
                }
                self.record(&path);
                write_env_script(&path, &target, &vars)?;
            }
            InstallAction::Completion { shell, from, name } => {
                let src = ctx.expand_path(from)?;
                let name = ctx.expand(name)?;
                let dest = completion_path(&ctx.layout.share(), *shell, &name);
                self.record(&dest);
                copy_path(&src, &dest)?;
            }
            InstallAction::Manpages {
                from,
                sections,
                include,
                prune,
                into,
            } => {
                let from = ctx.expand_path(from)?;
                let into = match into {
                    Some(dir) => ctx.expand_path(dir)?,
                    None => ctx.layout.shared_prefix.join("share").join("man"),
                };
                for section in sections {
                    let dest = into.join(section);
                    self.record(&dest);
                    link_manpages(&from.join(section), &dest, include, prune, |page| {
                        self.record(page)
                    })?;
                }
            }
            InstallAction::Bootstrap(spec) => {
                self.record(&ctx.expand_path(&spec.target_prefix)?);
                Bootstrapper::new(ctx, spec).run()?;
            }
            InstallAction::Docs { from } => {
                let doc = ctx.layout.doc();
                self.record(&doc);
                ensure_dir(&doc)?;
                for pattern in from {
                    for src in matching(&ctx.expand_path(pattern)?)? {
                        let dest = doc.join(file_name(&src)?);
                        self.record(&dest);
                        copy_path(&src, &dest)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn matching(pattern: &Path) -> Result<Vec<PathBuf>> {
    let paths = glob_paths(pattern)?;
    if paths.is_empty() {
        bail!("{} matched nothing", pattern.display());
    }
    Ok(paths)
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))
}

/// `ln -sf`, using a relative target when both ends are inside `prefix`.
pub fn link_into(target: &Path, link: &Path, prefix: &Path) -> Result<()> {
    let target = match link.parent() {
        Some(dir) if target.is_absolute() && is_inside(target, prefix) && is_inside(link, prefix) => {
            relative_path(dir, target)
        }
        _ => target.to_path_buf(),
    };
    force_symlink(&target, link)
}

pub fn completion_path(share: &Path, shell: CompletionShell, command: &str) -> PathBuf {
    share.join(shell.share_dir()).join(shell.file_name(command))
}

/// Write a wrapper that exports `env` and execs `target`.
///
/// Values are placed in double quotes unchanged, so shell expansions such
/// as `${VAR:-default}` are evaluated when the script runs.
pub fn write_env_script(path: &Path, target: &Path, env: &[(&str, String)]) -> Result<()> {
    let mut script = String::from("#!/bin/bash\n");
    for (key, value) in env {
        script.push_str(&format!("export {}=\"{}\"\n", key, value));
    }
    script.push_str(&format!("exec \"{}\" \"$@\"\n", target.display()));
    atomic_write(path, script.as_bytes())?;
    set_executable(path)
}

fn matches_any(patterns: &[glob::Pattern], name: &str) -> bool {
    patterns.iter().any(|p| p.matches(name))
}

fn compile(globs: &[String]) -> Result<Vec<glob::Pattern>> {
    globs
        .iter()
        .map(|g| glob::Pattern::new(g).with_context(|| format!("invalid glob `{}`", g)))
        .collect()
}

/// Refresh the manpage links of one section.
///
/// Entries in `dest` matching `prune` are removed first, dangling links
/// included, then every page in `src` matching `include` (all pages when
/// empty) is linked, replacing whatever was there. `before_link` sees each
/// link path before it is written.
pub fn link_manpages(
    src: &Path,
    dest: &Path,
    include: &[String],
    prune: &[String],
    mut before_link: impl FnMut(&Path),
) -> Result<()> {
    ensure_dir(dest)?;
    let prune = compile(prune)?;
    let include = compile(include)?;

    // read_dir rather than glob: glob skips dangling symlinks
    for entry in std::fs::read_dir(dest).with_context(|| format!("failed to read {}", dest.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if matches_any(&prune, &name) {
            tracing::debug!("pruning stale manpage {}", entry.path().display());
            remove_path_if_exists(&entry.path())?;
        }
    }

    if !src.is_dir() {
        tracing::debug!("no manpages in {}", src.display());
        return Ok(());
    }
    let mut pages: Vec<PathBuf> = std::fs::read_dir(src)
        .with_context(|| format!("failed to read {}", src.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    pages.sort();
    for page in pages {
        let name = file_name(&page)?.to_string_lossy().into_owned();
        if include.is_empty() || matches_any(&include, &name) {
            let link = dest.join(&name);
            before_link(&link);
            force_symlink(&page, &link)?;
        }
    }
    Ok(())
}
