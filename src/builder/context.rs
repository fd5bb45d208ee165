//! Build context: layout, resolved dependencies, environment overlay and
//! working directory stack for one install.
//!
//! Nothing in here touches the parent process. Environment changes live in
//! an [`EnvOverlay`] that is applied to each spawned child, and directory
//! changes are tracked by a [`DirStack`] instead of `chdir`.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::builder::plan::BuildPlan;
use crate::core::formula::version_part;
use crate::core::registry::Keg;
use crate::core::step::{EnvAction, EnvOp};
use crate::core::template::{self, Placeholder};
use crate::error::PipelineError;
use crate::resolver::ResolvedDeps;
use crate::sources::FetchedResource;
use crate::util::process::{find_executable_in, ProcessBuilder};

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

/// Filesystem locations of one install.
#[derive(Debug, Clone)]
pub struct Layout {
    pub name: String,
    pub version: String,
    /// Keg prefix, `<cellar>/<name>/<pkg_version>`
    pub prefix: PathBuf,
    pub opt_prefix: PathBuf,
    pub shared_prefix: PathBuf,
    pub cellar: PathBuf,
    pub cache: PathBuf,
    pub buildpath: PathBuf,
    pub testpath: Option<PathBuf>,
    pub jobs: Option<usize>,
}

impl Layout {
    /// Layout for building `plan` into `keg`.
    pub fn new(plan: &BuildPlan, keg: &Keg, shared_prefix: &Path, cache: &Path, buildpath: &Path) -> Self {
        Layout {
            name: plan.formula.clone(),
            version: plan.version.clone(),
            prefix: keg.prefix.clone(),
            opt_prefix: keg.opt_prefix.clone(),
            shared_prefix: shared_prefix.to_path_buf(),
            cellar: shared_prefix.join("Cellar"),
            cache: cache.to_path_buf(),
            buildpath: buildpath.to_path_buf(),
            testpath: None,
            jobs: None,
        }
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn bin(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn share(&self) -> PathBuf {
        self.prefix.join("share")
    }

    pub fn doc(&self) -> PathBuf {
        self.share().join("doc").join(&self.name)
    }

    /// Value of a layout placeholder.
    pub fn var(&self, name: &str) -> Option<String> {
        let path = match name {
            "prefix" => self.prefix.clone(),
            "bin" => self.bin(),
            "sbin" => self.prefix.join("sbin"),
            "lib" => self.prefix.join("lib"),
            "include" => self.prefix.join("include"),
            "libexec" => self.prefix.join("libexec"),
            "share" => self.share(),
            "man" => self.share().join("man"),
            "man1" => self.share().join("man").join("man1"),
            "doc" => self.doc(),
            "etc" => self.shared_prefix.join("etc"),
            "var" => self.shared_prefix.join("var"),
            "buildpath" => self.buildpath.clone(),
            "testpath" => self.testpath.clone()?,
            "shared_prefix" => self.shared_prefix.clone(),
            "cellar" => self.cellar.clone(),
            "cache" => self.cache.clone(),
            "opt_prefix" => self.opt_prefix.clone(),
            "opt_bin" => self.opt_prefix.join("bin"),
            "opt_lib" => self.opt_prefix.join("lib"),
            "opt_include" => self.opt_prefix.join("include"),
            "opt_libexec" => self.opt_prefix.join("libexec"),
            "name" => return Some(self.name.clone()),
            "version" => return Some(self.version.clone()),
            "version.major" => return Some(version_part(&self.version, 1)),
            "version.major_minor" => return Some(version_part(&self.version, 2)),
            "jobs" => {
                let jobs = self.jobs.unwrap_or_else(|| {
                    std::thread::available_parallelism()
                        .map(|n| n.get())
                        .unwrap_or(1)
                });
                return Some(jobs.to_string());
            }
            _ => return None,
        };
        Some(path.display().to_string())
    }
}

/// Environment changes applied to child processes.
///
/// Reads fall through to the parent environment for keys the overlay has
/// not touched.
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
    removed: BTreeSet<String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.vars.get(key) {
            return Some(value.clone());
        }
        if self.removed.contains(key) {
            return None;
        }
        std::env::var(key).ok()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.removed.remove(key);
        self.vars.insert(key.to_string(), value.into());
    }

    pub fn unset(&mut self, key: &str) {
        self.vars.remove(key);
        self.removed.insert(key.to_string());
    }

    fn join(&mut self, key: &str, value: &str, sep: &str, front: bool) {
        let joined = match self.get(key).filter(|v| !v.is_empty()) {
            Some(existing) if front => format!("{}{}{}", value, sep, existing),
            Some(existing) => format!("{}{}{}", existing, sep, value),
            None => value.to_string(),
        };
        self.set(key, joined);
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.join(key, value, " ", false);
    }

    pub fn prepend(&mut self, key: &str, value: &str) {
        self.join(key, value, " ", true);
    }

    pub fn prepend_path(&mut self, key: &str, dir: &str) {
        self.join(key, dir, PATH_SEPARATOR, true);
    }

    pub fn append_path(&mut self, key: &str, dir: &str) {
        self.join(key, dir, PATH_SEPARATOR, false);
    }

    /// Append flags to both `CFLAGS` and `CXXFLAGS`.
    pub fn append_to_cflags(&mut self, flags: &str) {
        self.append("CFLAGS", flags);
        self.append("CXXFLAGS", flags);
    }

    /// Apply an operation whose value is already expanded.
    pub fn apply_op(&mut self, op: EnvAction, key: &str, value: &str) {
        match op {
            EnvAction::Set => self.set(key, value),
            EnvAction::Append => self.append(key, value),
            EnvAction::Prepend => self.prepend(key, value),
            EnvAction::PrependPath => self.prepend_path(key, value),
            EnvAction::AppendPath => self.append_path(key, value),
            EnvAction::AppendToCflags => self.append_to_cflags(value),
            EnvAction::Unset => self.unset(key),
        }
    }

    /// Current `PATH` as seen by children.
    pub fn search_path(&self) -> String {
        self.get("PATH").unwrap_or_default()
    }

    /// Variables set by the overlay.
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn apply_to(&self, mut pb: ProcessBuilder) -> ProcessBuilder {
        for key in &self.removed {
            pb = pb.env_remove(key);
        }
        pb.envs(&self.vars)
    }
}

/// Stack of working directories.
///
/// The bottom entry is the base directory; [`DirStack::push`] returns a
/// guard that pops back to the previous directory when dropped, on error
/// paths as well.
#[derive(Debug, Clone)]
pub struct DirStack {
    dirs: RefCell<Vec<PathBuf>>,
}

impl DirStack {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        DirStack {
            dirs: RefCell::new(vec![base.into()]),
        }
    }

    pub fn current(&self) -> PathBuf {
        self.dirs.borrow().last().cloned().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.dirs.borrow().len()
    }

    /// Enter `dir`; relative paths resolve against the current directory.
    pub fn push(&self, dir: impl AsRef<Path>) -> DirGuard<'_> {
        let depth = self.depth();
        let next = self.current().join(dir);
        self.dirs.borrow_mut().push(next);
        DirGuard { stack: self, depth }
    }
}

pub struct DirGuard<'a> {
    stack: &'a DirStack,
    depth: usize,
}

impl Drop for DirGuard<'_> {
    fn drop(&mut self) {
        self.stack.dirs.borrow_mut().truncate(self.depth);
    }
}

/// Everything an install stage needs, threaded explicitly through the
/// executor, installer and verifier.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub layout: Layout,
    pub deps: ResolvedDeps,
    pub resources: BTreeMap<String, FetchedResource>,
    pub env: EnvOverlay,
    pub dirs: DirStack,
    pub verbose: bool,
}

impl BuildContext {
    /// Context rooted at the layout's buildpath.
    pub fn new(layout: Layout, deps: ResolvedDeps) -> Self {
        let dirs = DirStack::new(&layout.buildpath);
        BuildContext {
            layout,
            deps,
            resources: BTreeMap::new(),
            env: EnvOverlay::new(),
            dirs,
            verbose: false,
        }
    }

    pub fn with_resources(mut self, resources: impl IntoIterator<Item = FetchedResource>) -> Self {
        for fetched in resources {
            self.resources.insert(fetched.resource.name.clone(), fetched);
        }
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Copy of this context for smoke tests: `{testpath}` is bound and
    /// relative paths resolve against it. Build env ops are dropped.
    pub fn for_tests(&self, testpath: &Path, deps: ResolvedDeps) -> Self {
        let mut layout = self.layout.clone();
        layout.testpath = Some(testpath.to_path_buf());
        BuildContext {
            layout,
            deps,
            resources: self.resources.clone(),
            env: EnvOverlay::new(),
            dirs: DirStack::new(testpath),
            verbose: self.verbose,
        }
    }

    fn plan_error(&self, message: String) -> PipelineError {
        PipelineError::Plan {
            formula: self.layout.name.clone(),
            message,
        }
    }

    fn lookup(&self, placeholder: &Placeholder<'_>) -> Result<Option<String>, String> {
        match *placeholder {
            Placeholder::Var(name) => Ok(self.layout.var(name)),
            Placeholder::Dep { name, field } => match self.deps.get(name) {
                Some(keg) => Ok(keg.field(field)),
                None => Err(format!("dependency `{}` is not resolved for this stage", name)),
            },
            Placeholder::Resource(name) => match self.resources.get(name) {
                Some(fetched) => Ok(Some(fetched.download.display().to_string())),
                None => Err(format!("unknown resource `{}`", name)),
            },
            Placeholder::ResourceDir(name) => match self.resources.get(name) {
                Some(fetched) => match fetched.staged {
                    Some(ref dir) => Ok(Some(dir.display().to_string())),
                    None => Err(format!("resource `{}` is not staged (set `stage_to`)", name)),
                },
                None => Err(format!("unknown resource `{}`", name)),
            },
            Placeholder::Which(program) => {
                find_executable_in(program, &self.env.search_path(), &self.dirs.current())
                    .map(|p| Some(p.display().to_string()))
                    .ok_or_else(|| format!("`{}` not found in PATH", program))
            }
            Placeholder::Env(var) => Ok(Some(self.env.get(var).unwrap_or_default())),
        }
    }

    /// Expand the placeholders of `input`.
    pub fn expand(&self, input: &str) -> Result<String, PipelineError> {
        template::expand(input, |p| self.lookup(p)).map_err(|e| self.plan_error(e))
    }

    pub fn expand_all(&self, inputs: &[String]) -> Result<Vec<String>, PipelineError> {
        inputs.iter().map(|s| self.expand(s)).collect()
    }

    /// Expand a path; relative results resolve against the current directory.
    pub fn expand_path(&self, input: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.resolve_path(self.expand(input)?))
    }

    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dirs.current().join(path)
        }
    }

    /// Apply planned environment operations in order.
    pub fn apply_env_ops(&mut self, ops: &[EnvOp]) -> Result<(), PipelineError> {
        for op in ops {
            let value = self.expand(&op.value)?;
            tracing::debug!("env {:?} {} {}", op.op, op.key, value);
            self.env.apply_op(op.op, &op.key, &value);
        }
        Ok(())
    }

    /// Process builder for an already expanded argv, running in the
    /// current directory with `env` applied. Bare program names are looked
    /// up through the overlay's PATH.
    pub fn command(&self, argv: &[String], env: &EnvOverlay) -> Result<ProcessBuilder, PipelineError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| self.plan_error("empty command".to_string()))?;
        let cwd = self.dirs.current();
        let program = if Path::new(program).components().count() == 1 {
            find_executable_in(program, &env.search_path(), &cwd)
                .unwrap_or_else(|| PathBuf::from(program))
        } else if Path::new(program).is_relative() {
            cwd.join(program)
        } else {
            PathBuf::from(program)
        };
        Ok(env.apply_to(ProcessBuilder::new(program).args(args).cwd(cwd)))
    }
}
