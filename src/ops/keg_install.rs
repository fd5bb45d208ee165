//! Implementation of `keg install`.
//!
//! Runs Resolve → Fetch → Patch → Build → Install → Verify for one
//! formula. Every stage that can fail without touching the prefix
//! (planning, resolution, downloads) runs before the prefix is created.
//! A keg being reinstalled is moved aside only once those stages pass.
//! The receipt is written last; until then a [`KegGuard`] removes the
//! half-populated prefix and whatever post-install created outside it,
//! and puts a replaced keg back, if anything fails.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::builder::{BuildContext, BuildExecutor, BuildPlan, Installer, Layout, Verifier};
use crate::builder::install::{link_into, CreatedPath};
use crate::core::dependency::Phase;
use crate::core::formula::Formula;
use crate::core::platform::{BuildMode, Platform};
use crate::core::registry::{Cellar, InstallReceipt, Keg};
use crate::ops::plan::{host_platform, load_formula};
use crate::resolver::{DependencyResolver, ResolvedDeps};
use crate::sources::{FetchedResource, ResourceFetcher};
use crate::util::fs::{ensure_dir, list_files_relative, remove_path_if_exists};
use crate::util::hash::KegDigest;
use crate::util::GlobalContext;

/// Options for the install command.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Build from the development branch
    pub head: bool,

    /// Build a relocatable artifact for distribution
    pub bottle: bool,

    /// Keep the prefix and build tree after a failure
    pub keep_failed: bool,

    /// Reinstall even if this version is already installed
    pub force: bool,

    /// Parallel jobs passed to `make`
    pub jobs: Option<usize>,

    /// Stream build output
    pub verbose: bool,

    /// Do not run the formula's test steps
    pub skip_test: bool,
}

impl InstallOptions {
    pub fn mode(&self) -> BuildMode {
        BuildMode {
            bottle: self.bottle,
            head: self.head,
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug)]
pub struct InstallResult {
    pub keg: Keg,
    pub receipt: InstallReceipt,
    pub caveats: Option<String>,
    pub duration: Duration,
}

/// Install a formula by name or path for the host platform.
pub fn install(gctx: &GlobalContext, name_or_path: &str, opts: &InstallOptions) -> Result<InstallResult> {
    let formula = load_formula(gctx, name_or_path)?;
    let platform = host_platform(gctx, opts.mode());
    install_formula(gctx, &formula, &platform, opts)
}

/// Install an already loaded formula for `platform`.
pub fn install_formula(
    gctx: &GlobalContext,
    formula: &Formula,
    platform: &Platform,
    opts: &InstallOptions,
) -> Result<InstallResult> {
    let start = Instant::now();

    if let Some(ref deprecated) = formula.formula.deprecated {
        tracing::warn!(
            "{} has been deprecated since {} because it {}",
            formula.name(),
            deprecated.date,
            deprecated.because
        );
    }

    let plan = BuildPlan::evaluate(formula, platform)?;
    let cellar = Cellar::new(gctx.root());
    let keg = cellar.keg_for(&plan.formula, &plan.pkg_version);
    check_reinstall(&keg, opts.force)?;

    // Resolve
    let resolver = DependencyResolver::new(&cellar);
    let deps = resolver.resolve(&plan, &[Phase::Build, Phase::Run])?;
    let test_deps = if opts.skip_test || plan.tests.is_empty() {
        ResolvedDeps::new()
    } else {
        resolver.resolve(&plan, &[Phase::Test])?
    };

    // Fetch everything before the build tree exists
    let mut fetcher = ResourceFetcher::new(gctx.cache_dir());
    if let Some(ref source) = plan.source {
        fetcher.prefetch_source(&plan.formula, source)?;
    }
    for resource in &plan.resources {
        fetcher.fetch_resource(resource)?;
    }

    let build_root = gctx.build_dir();
    ensure_dir(&build_root)?;
    let build_tree = tempfile::Builder::new()
        .prefix(&format!("{}-{}-", plan.formula, plan.pkg_version))
        .tempdir_in(&build_root)
        .with_context(|| format!("failed to create build directory in {}", build_root.display()))?;
    let buildpath = build_tree.path().to_path_buf();

    let keep_failed = opts.keep_failed || gctx.config().build.keep_failed;
    let result = build_and_install(
        gctx,
        &plan,
        &keg,
        &buildpath,
        deps,
        test_deps,
        &mut fetcher,
        opts,
        keep_failed,
    );

    match result {
        Ok((receipt, caveats)) => {
            if let Some(ref text) = caveats {
                eprintln!("==> Caveats\n{}", text.trim_end());
            }
            let duration = start.elapsed();
            eprintln!(
                "    Installed {} {} ({} files) in {:.2}s",
                keg.name,
                keg.version,
                receipt.file_count,
                duration.as_secs_f64()
            );
            Ok(InstallResult {
                keg,
                receipt,
                caveats,
                duration,
            })
        }
        Err(e) => {
            if keep_failed {
                #[allow(deprecated)]
                let kept = build_tree.into_path();
                eprintln!("note: build tree kept at {}", kept.display());
                eprintln!("note: partial keg kept at {}", keg.prefix.display());
            }
            Err(e)
        }
    }
}

fn check_reinstall(keg: &Keg, force: bool) -> Result<()> {
    if keg.receipt_path().is_file() && !force {
        bail!(
            "{} {} is already installed\n\
             hint: use `keg install --force {}` to reinstall",
            keg.name,
            keg.version,
            keg.name
        );
    }
    Ok(())
}

/// Clear the keg directory for a new build. An installed keg is moved
/// aside and its new location returned; a keg without a receipt is left
/// over from an interrupted install and is deleted.
fn set_aside(keg: &Keg) -> Result<Option<PathBuf>> {
    if std::fs::symlink_metadata(&keg.prefix).is_err() {
        return Ok(None);
    }
    if !keg.receipt_path().is_file() {
        tracing::warn!("removing incomplete keg at {}", keg.prefix.display());
        remove_path_if_exists(&keg.prefix)?;
        return Ok(None);
    }

    let aside = keg.prefix.with_file_name(format!(".{}.previous", keg.version));
    remove_path_if_exists(&aside)?;
    std::fs::rename(&keg.prefix, &aside)
        .with_context(|| format!("failed to move {} aside", keg.prefix.display()))?;
    tracing::info!("Replacing installed {} {}", keg.name, keg.version);
    Ok(Some(aside))
}

#[allow(clippy::too_many_arguments)]
fn build_and_install(
    gctx: &GlobalContext,
    plan: &BuildPlan,
    keg: &Keg,
    buildpath: &Path,
    deps: ResolvedDeps,
    test_deps: ResolvedDeps,
    fetcher: &mut ResourceFetcher,
    opts: &InstallOptions,
    keep_failed: bool,
) -> Result<(InstallReceipt, Option<String>)> {
    let source_dir = match plan.source_subdir {
        Some(ref subdir) => buildpath.join(subdir),
        None => buildpath.to_path_buf(),
    };
    if let Some(ref source) = plan.source {
        fetcher
            .stage_source(&plan.formula, source, &source_dir)
            .with_context(|| format!("failed to stage source for {}", plan.formula))?;
    }
    let staged: Vec<FetchedResource> = plan
        .resources
        .iter()
        .map(|r| fetcher.fetch_and_stage(r, buildpath))
        .collect::<Result<_>>()?;

    let jobs = opts.jobs.or(gctx.config().build.jobs);
    let layout = Layout::new(plan, keg, gctx.root(), gctx.cache_dir(), buildpath).with_jobs(jobs);
    let mut ctx = BuildContext::new(layout, deps)
        .with_resources(staged)
        .with_verbose(opts.verbose);
    ctx.apply_env_ops(&plan.env)?;

    let previous = set_aside(keg)?;
    let mut guard = KegGuard::new(&keg.prefix, previous, keep_failed);
    ensure_dir(&keg.prefix)?;

    BuildExecutor::new(&ctx).execute(plan)?;

    let installer = Installer::new(&ctx);
    installer.run(&plan.install)?;
    link_keg(keg, gctx.root(), plan.keg_only, &mut guard)?;
    let post_install = installer.run(&plan.post_install);
    guard.track_all(installer.take_created());
    post_install?;

    if !opts.skip_test {
        Verifier::new(&ctx, test_deps).run(&plan.tests)?;
    }

    let caveats = plan.caveats.as_deref().map(|c| ctx.expand(c)).transpose()?;
    let receipt = receipt_for(plan, keg, &ctx.deps)?;
    receipt.write(&keg.receipt_path())?;
    guard.commit();
    Ok((receipt, caveats))
}

/// Record of the installed files and run-time dependencies.
fn receipt_for(plan: &BuildPlan, keg: &Keg, deps: &ResolvedDeps) -> Result<InstallReceipt> {
    let files = list_files_relative(&keg.prefix)?;
    let mut digest = KegDigest::new();
    for file in &files {
        digest.add(&keg.prefix, file)?;
    }

    let runtime_dependencies: BTreeMap<String, String> = plan
        .dependencies_for(&[Phase::Run])
        .into_iter()
        .filter_map(|d| deps.get(&d.name))
        .map(|k| (k.name.clone(), k.version.clone()))
        .collect();

    let revision = plan
        .pkg_version
        .rsplit_once('_')
        .and_then(|(_, r)| r.parse().ok())
        .unwrap_or(0);

    Ok(InstallReceipt {
        name: plan.formula.clone(),
        version: plan.version.clone(),
        revision,
        installed_at: InstallReceipt::now(),
        keg_only: plan.keg_only,
        head: plan.platform.mode.head,
        source: plan.source.as_ref().map(|s| s.url().to_string()),
        runtime_dependencies,
        file_count: files.len(),
        files_digest: digest.finish(),
    })
}

/// Point `opt/<name>` at the keg and, unless keg-only, link its
/// executables into `<root>/bin`.
fn link_keg(keg: &Keg, root: &Path, keg_only: bool, guard: &mut KegGuard) -> Result<()> {
    let opt = CreatedPath::before_write(&keg.opt_prefix);
    link_into(&keg.prefix, &keg.opt_prefix, root)?;
    guard.track(opt);

    if keg_only {
        tracing::debug!("{} is keg-only, not linking into {}", keg.name, root.display());
        return Ok(());
    }

    let bin = keg.bin();
    if !bin.is_dir() {
        return Ok(());
    }

    let shared_bin = root.join("bin");
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&bin)
        .with_context(|| format!("failed to read {}", bin.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for entry in entries {
        let Some(file_name) = entry.file_name() else {
            continue;
        };
        let link = shared_bin.join(file_name);
        if let Ok(meta) = std::fs::symlink_metadata(&link) {
            if !meta.file_type().is_symlink() {
                tracing::warn!("not overwriting {}: not a symlink", link.display());
                continue;
            }
        }
        let created = CreatedPath::before_write(&link);
        link_into(&entry, &link, root)?;
        guard.track(created);
    }
    Ok(())
}

/// Rolls back a failed install when dropped before [`KegGuard::commit`]:
/// created paths are undone newest first, the partial keg is removed and
/// a keg that was set aside is moved back.
struct KegGuard {
    prefix: PathBuf,
    previous: Option<PathBuf>,
    created: Vec<CreatedPath>,
    keep_failed: bool,
    committed: bool,
}

impl KegGuard {
    fn new(prefix: &Path, previous: Option<PathBuf>, keep_failed: bool) -> Self {
        KegGuard {
            prefix: prefix.to_path_buf(),
            previous,
            created: Vec::new(),
            keep_failed,
            committed: false,
        }
    }

    fn track(&mut self, created: Option<CreatedPath>) {
        self.created.extend(created);
    }

    fn track_all(&mut self, created: Vec<CreatedPath>) {
        self.created.extend(created);
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn roll_back(&mut self) {
        for created in self.created.iter().rev() {
            if let Err(e) = created.undo() {
                tracing::warn!("failed to undo {}: {:#}", created.path.display(), e);
            }
        }
        match remove_path_if_exists(&self.prefix) {
            Ok(_) => tracing::debug!("removed partial keg {}", self.prefix.display()),
            Err(e) => tracing::warn!("failed to remove {}: {:#}", self.prefix.display(), e),
        }
        match self.previous {
            Some(ref previous) => {
                if let Err(e) = std::fs::rename(previous, &self.prefix) {
                    tracing::warn!(
                        "failed to restore {} from {}: {}",
                        self.prefix.display(),
                        previous.display(),
                        e
                    );
                }
            }
            // drop the rack too if this was its only version
            None => {
                if let Some(rack) = self.prefix.parent() {
                    let _ = std::fs::remove_dir(rack);
                }
            }
        }
    }
}

impl Drop for KegGuard {
    fn drop(&mut self) {
        if self.committed {
            if let Some(ref previous) = self.previous {
                if let Err(e) = remove_path_if_exists(previous) {
                    tracing::warn!("failed to remove {}: {:#}", previous.display(), e);
                }
            }
        } else if self.keep_failed {
            if let Some(ref previous) = self.previous {
                eprintln!("note: replaced keg kept at {}", previous.display());
            }
        } else {
            self.roll_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::PackageRegistry;
    use crate::error::PipelineError;
    use crate::test_support::{dependency, file_url, formula, resource, sh_step, tarball_gz, Sandbox};
    use crate::util::hash::sha256_bytes;

    fn linux() -> Platform {
        Platform::new("linux", "x86_64")
    }

    fn install_text(sb: &Sandbox, name: &str, content: &str, opts: &InstallOptions) -> Result<InstallResult> {
        let path = sb.write_formula(name, content);
        let parsed = Formula::load(&path).unwrap();
        install_formula(&sb.gctx(), &parsed, &linux(), opts)
    }

    fn exit_code(err: &anyhow::Error) -> i32 {
        err.downcast_ref::<PipelineError>()
            .map(|e| e.exit_code())
            .unwrap_or(1)
    }

    #[test]
    fn test_step_output_lands_in_prefix() {
        let sb = Sandbox::new();
        sb.install_fake_keg("zlib", "1.3.1");
        let content = formula(
            "app",
            "1.0",
            &format!(
                "{}{}",
                dependency("zlib", ""),
                sh_step("build", "mkdir -p {prefix} && echo built > {prefix}/out.bin")
            ),
        );

        let result = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();
        assert!(result.keg.prefix.join("out.bin").is_file());
        assert!(result.keg.receipt_path().is_file());
        assert_eq!(result.receipt.runtime_dependencies.get("zlib").unwrap(), "1.3.1");
        assert_eq!(
            sb.cellar().lookup("app").unwrap().unwrap().version,
            "1.0"
        );
    }

    #[test]
    fn test_integrity_failure_runs_nothing() {
        let sb = Sandbox::new();
        let tarball = sb.write_work_file("extra-1.0.tar.gz", b"actual bytes");
        let marker = sb.work().join("ran");
        let content = formula(
            "app",
            "1.0",
            &format!(
                "{}{}",
                resource("extra", &file_url(&tarball), &sha256_bytes(b"expected bytes")),
                sh_step("build", &format!("touch {}", marker.display()))
            ),
        );

        let err = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap_err();
        assert_eq!(exit_code(&err), 12);
        assert!(!marker.exists());
        assert!(!sb.cellar().keg_for("app", "1.0").prefix.exists());
    }

    #[test]
    fn test_missing_dependency_is_resolution_error() {
        let sb = Sandbox::new();
        let content = formula("app", "1.0", &dependency("libuv", ""));
        let err = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap_err();
        assert_eq!(exit_code(&err), 11);
    }

    #[test]
    fn test_gated_dependency_is_not_in_env() {
        let sb = Sandbox::new();
        sb.install_fake_keg("zlib", "1.3.1");
        let content = formula(
            "app",
            "1.0",
            &format!(
                "{}{}{}",
                dependency("zlib", ""),
                dependency("macos-only", "when = { os = \"macos\" }"),
                sh_step("build", "mkdir -p {prefix} && env > {prefix}/env.txt")
            ),
        );
        let content = content.replace(
            "[[steps]]",
            "[[env]]\nop = \"prepend_path\"\nkey = \"PATH\"\nvalue = \"{dep:zlib.bin}\"\n\n[[steps]]",
        );

        let result = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();
        let env = std::fs::read_to_string(result.keg.prefix.join("env.txt")).unwrap();
        assert!(env.contains("Cellar/zlib/1.3.1/bin"));
        assert!(!env.contains("macos-only"));
    }

    #[test]
    fn test_failed_build_removes_prefix_and_links() {
        let sb = Sandbox::new();
        let content = formula(
            "app",
            "1.0",
            &format!(
                "{}{}",
                sh_step("build", "mkdir -p {prefix}/bin && touch {prefix}/bin/app"),
                sh_step("fail", "echo boom >&2; exit 3")
            ),
        );

        let err = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap_err();
        assert_eq!(exit_code(&err), 14);
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Build { output, .. }) => assert!(output.contains("boom")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!sb.root().join("Cellar/app").exists());
        assert!(!sb.root().join("opt/app").exists());
    }

    #[test]
    fn test_keep_failed_leaves_prefix() {
        let sb = Sandbox::new();
        let content = formula(
            "app",
            "1.0",
            &sh_step("build", "mkdir -p {prefix} && touch {prefix}/partial && exit 1"),
        );
        let opts = InstallOptions {
            keep_failed: true,
            ..Default::default()
        };
        install_text(&sb, "app", &content, &opts).unwrap_err();
        let keg = sb.cellar().keg_for("app", "1.0");
        assert!(keg.prefix.join("partial").is_file());
        assert!(!keg.receipt_path().exists());
        assert!(sb.cellar().lookup("app").unwrap().is_none());
    }

    #[test]
    fn test_verification_failure_leaves_no_keg() {
        let sb = Sandbox::new();
        let content = formula(
            "app",
            "1.0",
            r#"
[[steps]]
run = ["sh", "-c", "mkdir -p {prefix}/bin"]

[[test]]
step = "assert"
path = "{bin}/app"
"#,
        );
        let err = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap_err();
        assert_eq!(exit_code(&err), 15);
        assert!(sb.cellar().lookup("app").unwrap().is_none());
    }

    #[test]
    fn test_reinstall_requires_force_and_is_deterministic() {
        let sb = Sandbox::new();
        let content = formula(
            "app",
            "1.0",
            &sh_step(
                "build",
                "mkdir -p {prefix}/bin {prefix}/share && echo a > {prefix}/bin/app && echo b > {prefix}/share/b",
            ),
        );
        let first = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();

        let err = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap_err();
        assert!(err.to_string().contains("already installed"));

        let opts = InstallOptions {
            force: true,
            ..Default::default()
        };
        let second = install_text(&sb, "app", &content, &opts).unwrap();
        assert_eq!(first.receipt.files_digest, second.receipt.files_digest);
        assert_eq!(first.receipt.file_count, second.receipt.file_count);
    }

    fn force() -> InstallOptions {
        InstallOptions {
            force: true,
            ..Default::default()
        }
    }

    const APP_BUILD: &str = "mkdir -p {prefix}/bin && echo v1 > {prefix}/bin/app";

    fn assert_first_install_intact(sb: &Sandbox) {
        let keg = sb.cellar().keg_for("app", "1.0");
        assert!(keg.receipt_path().is_file());
        assert_eq!(std::fs::read_to_string(keg.bin().join("app")).unwrap(), "v1\n");
        // links resolve to the restored keg
        assert!(sb.root().join("opt/app/bin/app").is_file());
        assert!(sb.root().join("bin/app").is_file());
        assert!(!keg.prefix.with_file_name(".1.0.previous").exists());
    }

    #[test]
    fn test_forced_reinstall_keeps_keg_when_resolution_fails() {
        let sb = Sandbox::new();
        let content = formula("app", "1.0", &sh_step("build", APP_BUILD));
        install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();

        let broken = formula(
            "app",
            "1.0",
            &format!("{}{}", dependency("libuv", ""), sh_step("build", APP_BUILD)),
        );
        let err = install_text(&sb, "app", &broken, &force()).unwrap_err();
        assert_eq!(exit_code(&err), 11);
        assert_first_install_intact(&sb);
    }

    #[test]
    fn test_forced_reinstall_restores_keg_when_build_fails() {
        let sb = Sandbox::new();
        let content = formula("app", "1.0", &sh_step("build", APP_BUILD));
        install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();

        let broken = formula(
            "app",
            "1.0",
            &sh_step("build", "mkdir -p {prefix}/bin && echo v2 > {prefix}/bin/app && exit 1"),
        );
        let err = install_text(&sb, "app", &broken, &force()).unwrap_err();
        assert_eq!(exit_code(&err), 14);
        assert_first_install_intact(&sb);
    }

    #[test]
    fn test_failed_verification_undoes_post_install() {
        let sb = Sandbox::new();
        std::fs::create_dir_all(sb.root().join("lib/other")).unwrap();
        let content = formula(
            "app",
            "1.0",
            &format!(
                r#"{}
[[post_install]]
action = "write"
path = "{{shared_prefix}}/lib/app/config"
contents = "root = {{shared_prefix}}"

[[post_install]]
action = "symlink"
target = "{{prefix}}/share/app.1"
link = "{{shared_prefix}}/share/man/man1/app.1"

[[test]]
step = "assert"
path = "{{bin}}/missing"
"#,
                sh_step("build", "mkdir -p {prefix}/share && touch {prefix}/share/app.1")
            ),
        );

        let err = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap_err();
        assert_eq!(exit_code(&err), 15);
        assert!(!sb.root().join("lib/app").exists());
        assert!(sb.root().join("lib/other").is_dir());
        assert!(std::fs::symlink_metadata(sb.root().join("share/man/man1/app.1")).is_err());
        assert!(!sb.root().join("share").exists());
        assert!(!sb.root().join("Cellar/app").exists());
    }

    #[test]
    fn test_links_bin_unless_keg_only() {
        let sb = Sandbox::new();
        let script = "mkdir -p {prefix}/bin && printf '#!/bin/sh\\n' > {prefix}/bin/tool && chmod +x {prefix}/bin/tool";
        let linked = formula("tool", "1.0", &sh_step("build", script));
        install_text(&sb, "tool", &linked, &InstallOptions::default()).unwrap();
        let link = sb.root().join("bin/tool");
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("../Cellar/tool/1.0/bin/tool")
        );

        let keg_only = formula("hidden", "1.0", &sh_step("build", &script.replace("tool", "hidden")))
            .replace("license = \"MIT\"", "license = \"MIT\"\nkeg_only = \"versioned formula\"");
        let result = install_text(&sb, "hidden", &keg_only, &InstallOptions::default()).unwrap();
        assert!(result.receipt.keg_only);
        assert!(!sb.root().join("bin/hidden").exists());
        assert!(sb.root().join("opt/hidden").exists());
    }

    #[test]
    fn test_caveats_are_expanded() {
        let sb = Sandbox::new();
        let content = formula("app", "1.0", &sh_step("build", "mkdir -p {prefix}")).replace(
            "license = \"MIT\"",
            "license = \"MIT\"\ncaveats = \"export APP_ROOT={opt_prefix}\"",
        );
        let result = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();
        assert_eq!(
            result.caveats.unwrap(),
            format!("export APP_ROOT={}", sb.root().join("opt/app").display())
        );
    }

    #[test]
    fn test_source_archive_is_staged_into_subdir() {
        let sb = Sandbox::new();
        let tarball = tarball_gz(&[("app-1.0/configure", "#!/bin/sh\necho configured > marker\n")]);
        let archive = sb.write_work_file("app-1.0.tar.gz", &tarball);
        let content = formula(
            "app",
            "1.0",
            &format!(
                r#"
[source]
url = "{}"
sha256 = "{}"
{}"#,
                file_url(&archive),
                sha256_bytes(&tarball),
                sh_step("build", "cd src && ./configure && mkdir -p {prefix} && cp marker {prefix}/")
            ),
        )
        .replace("license = \"MIT\"", "license = \"MIT\"\nsource_subdir = \"src\"");

        let result = install_text(&sb, "app", &content, &InstallOptions::default()).unwrap();
        assert_eq!(
            std::fs::read_to_string(result.keg.prefix.join("marker")).unwrap().trim(),
            "configured"
        );
        assert_eq!(result.receipt.source.as_deref(), Some(file_url(&archive).as_str()));
    }
}
