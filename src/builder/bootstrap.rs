//! Self-hosting install of a bundled package-manager client.
//!
//! Two environments take part. The bootstrap environment is a throwaway
//! copy of the client, unpacked from its resource and run by the freshly
//! built runtime. The target environment is where that run installs the
//! real client. Once the install finishes, the real client's metadata file
//! is replaced with the pristine one from the bootstrap copy, so it names
//! the canonical package instead of the transient download.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::builder::context::{BuildContext, EnvOverlay};
use crate::core::action::BootstrapSpec;
use crate::error::{describe_status, PipelineError};
use crate::sources::fetch::{stage_download, FetchedResource};
use crate::util::fs::{copy_path, ensure_dir, remove_path_if_exists};
use crate::util::process::combined_output;

/// Where the bootstrap copy lives and how it is run.
#[derive(Debug)]
struct BootstrapEnv {
    staging: PathBuf,
    argv: Vec<String>,
    env: EnvOverlay,
}

/// Where the real client is installed.
#[derive(Debug)]
struct TargetEnv {
    prefix: PathBuf,
    package_dir: PathBuf,
}

pub struct Bootstrapper<'a> {
    ctx: &'a BuildContext,
    spec: &'a BootstrapSpec,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(ctx: &'a BuildContext, spec: &'a BootstrapSpec) -> Self {
        Bootstrapper { ctx, spec }
    }

    pub fn run(&self) -> Result<()> {
        let fetched = self
            .ctx
            .resources
            .get(&self.spec.resource)
            .with_context(|| format!("unknown bootstrap resource `{}`", self.spec.resource))?;

        let bootstrap = self.bootstrap_env(fetched)?;
        let target = self.target_env()?;

        eprintln!(
            "  Bootstrapping {} into {}",
            self.spec.resource,
            target.prefix.display()
        );
        self.install(&bootstrap)?;
        self.promote(&bootstrap, &target)?;

        for path in &self.spec.discard {
            let path = self.ctx.expand_path(path)?;
            if remove_path_if_exists(&path)? {
                tracing::debug!("discarded {}", path.display());
            }
        }
        Ok(())
    }

    fn bootstrap_env(&self, fetched: &FetchedResource) -> Result<BootstrapEnv> {
        let ctx = self.ctx;
        let staging = ctx.expand_path(&self.spec.staging)?;
        if fetched.staged.as_deref() != Some(staging.as_path()) {
            remove_path_if_exists(&staging)?;
            stage_download(
                &fetched.download,
                &staging,
                fetched.resource.strip_prefix.as_deref(),
            )?;
        }

        let mut env = ctx.env.clone();
        for dir in &self.spec.path_prepend {
            env.prepend_path("PATH", &ctx.expand_path(dir)?.display().to_string());
        }
        for (key, value) in &self.spec.env {
            env.set(key, ctx.expand(value)?);
        }

        let mut argv = vec![
            ctx.expand(&self.spec.runtime)?,
            staging.join(&self.spec.entry).display().to_string(),
        ];
        argv.extend(ctx.expand_all(&self.spec.args)?);

        Ok(BootstrapEnv { staging, argv, env })
    }

    fn target_env(&self) -> Result<TargetEnv> {
        let prefix = self.ctx.expand_path(&self.spec.target_prefix)?;
        // the client refuses to install into a prefix without lib/
        ensure_dir(&prefix.join("lib"))?;
        Ok(TargetEnv {
            prefix,
            package_dir: self.ctx.expand_path(&self.spec.package_dir)?,
        })
    }

    fn install(&self, bootstrap: &BootstrapEnv) -> Result<()> {
        let pb = self.ctx.command(&bootstrap.argv, &bootstrap.env)?;
        let command = pb.display_command();
        tracing::debug!("bootstrap: {}", command);

        let build_error = |status: String, output: String| -> anyhow::Error {
            PipelineError::Build {
                command: command.clone(),
                cwd: self.ctx.dirs.current(),
                status,
                output,
            }
            .into()
        };

        if self.ctx.verbose {
            let status = pb
                .status()
                .map_err(|e| build_error(format!("failed to start: {:#}", e), String::new()))?;
            if !status.success() {
                return Err(build_error(describe_status(&status), String::new()));
            }
        } else {
            let output = pb
                .exec()
                .map_err(|e| build_error(format!("failed to start: {:#}", e), String::new()))?;
            if !output.status.success() {
                return Err(build_error(describe_status(&output.status), combined_output(&output)));
            }
        }
        Ok(())
    }

    fn promote(&self, bootstrap: &BootstrapEnv, target: &TargetEnv) -> Result<()> {
        if !target.package_dir.is_dir() {
            bail!(
                "bootstrap did not install anything into {}",
                target.package_dir.display()
            );
        }
        let pristine = bootstrap.staging.join(&self.spec.metadata_file);
        if !pristine.is_file() {
            bail!("bootstrap copy has no {}", self.spec.metadata_file);
        }
        copy_path(&pristine, &target.package_dir.join(&self.spec.metadata_file))?;
        tracing::debug!(
            "restored pristine {} in {}",
            self.spec.metadata_file,
            target.package_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::context::Layout;
    use crate::core::resource::Resource;
    use crate::resolver::ResolvedDeps;
    use crate::test_support::tarball_gz;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    const PRISTINE: &str = "{\"name\":\"client\",\"version\":\"1.2.3\"}\n";

    // Installs itself like `npm install --global <tarball>` would, leaving
    // the staging path behind in the installed metadata.
    const INSTALL_SH: &str = r#"#!/bin/sh
dest="$2/lib/node_modules/client"
mkdir -p "$dest" "$2/share/junk"
echo "{\"name\":\"client\",\"version\":\"1.2.3\",\"_resolved\":\"file:$1\"}" > "$dest/package.json"
echo "$CLIENT_MODE" > "$dest/mode.txt"
"#;

    fn context(root: &Path) -> BuildContext {
        let buildpath = root.join("build");
        std::fs::create_dir_all(&buildpath).unwrap();
        let archive = root.join("client-1.2.3.tgz");
        std::fs::write(
            &archive,
            tarball_gz(&[
                ("package/package.json", PRISTINE),
                ("package/bin/install.sh", INSTALL_SH),
            ]),
        )
        .unwrap();

        let layout = Layout {
            name: "runtime".into(),
            version: "1.0".into(),
            prefix: root.join("Cellar/runtime/1.0"),
            opt_prefix: root.join("opt/runtime"),
            shared_prefix: root.to_path_buf(),
            cellar: root.join("Cellar"),
            cache: root.join("cache"),
            buildpath,
            testpath: None,
            jobs: None,
        };
        BuildContext::new(layout, ResolvedDeps::new()).with_resources([FetchedResource {
            resource: Resource {
                name: "client".into(),
                url: "https://registry.example.com/client-1.2.3.tgz".into(),
                sha256: "0".repeat(64),
                version: None,
                stage_to: None,
                strip_prefix: None,
            },
            download: archive,
            staged: None,
        }])
    }

    fn spec() -> BootstrapSpec {
        let mut env = BTreeMap::new();
        env.insert("CLIENT_MODE".to_string(), "bootstrap".to_string());
        BootstrapSpec {
            resource: "client".into(),
            runtime: "sh".into(),
            staging: "client_bootstrap".into(),
            entry: "bin/install.sh".into(),
            args: vec!["{resource:client}".into(), "{libexec}".into()],
            target_prefix: "{libexec}".into(),
            package_dir: "{libexec}/lib/node_modules/client".into(),
            metadata_file: "package.json".into(),
            discard: vec!["{libexec}/share".into()],
            path_prepend: vec!["{bin}".into()],
            env,
        }
    }

    #[test]
    fn test_bootstrap_restores_pristine_metadata() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path());
        let spec = spec();
        Bootstrapper::new(&ctx, &spec).run().unwrap();

        let libexec = ctx.layout.prefix.join("libexec");
        let package = libexec.join("lib/node_modules/client");
        assert_eq!(std::fs::read_to_string(package.join("package.json")).unwrap(), PRISTINE);
        assert_eq!(
            std::fs::read_to_string(package.join("mode.txt")).unwrap().trim(),
            "bootstrap"
        );
        assert!(!libexec.join("share").exists());
        assert!(ctx.layout.buildpath.join("client_bootstrap/bin/install.sh").is_file());
    }

    #[test]
    fn test_failing_client_is_build_error() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path());
        let mut spec = spec();
        spec.entry = "bin/missing.sh".into();
        let err = Bootstrapper::new(&ctx, &spec).run().unwrap_err();
        assert_eq!(err.downcast_ref::<PipelineError>().unwrap().exit_code(), 14);
    }

    #[test]
    fn test_nothing_installed_fails() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path());
        let mut spec = spec();
        spec.package_dir = "{libexec}/lib/node_modules/other".into();
        let err = Bootstrapper::new(&ctx, &spec).run().unwrap_err();
        assert!(err.to_string().contains("did not install anything"));
    }
}
