//! Smoke tests against an installed keg.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use crate::builder::context::BuildContext;
use crate::core::step::TestStep;
use crate::error::{describe_status, PipelineError};
use crate::resolver::ResolvedDeps;
use crate::util::fs::{is_executable, write_string};
use crate::util::process::{combined_output, find_executable_in};

fn failure(message: impl Into<String>, output: impl Into<String>) -> anyhow::Error {
    PipelineError::Verification {
        message: message.into(),
        output: output.into(),
    }
    .into()
}

/// Runs test steps in a fresh testpath.
pub struct Verifier<'a> {
    ctx: &'a BuildContext,
    deps: ResolvedDeps,
}

impl<'a> Verifier<'a> {
    /// `deps` are the dependencies resolved for the test phase.
    pub fn new(ctx: &'a BuildContext, deps: ResolvedDeps) -> Self {
        Verifier { ctx, deps }
    }

    pub fn run(&self, steps: &[TestStep]) -> Result<()> {
        if steps.is_empty() {
            tracing::debug!("no test steps for {}", self.ctx.layout.name);
            return Ok(());
        }

        let testpath = TempDir::new()?;
        let ctx = self.ctx.for_tests(testpath.path(), self.deps.clone());
        eprintln!("     Testing {}", ctx.layout.name);
        for step in steps {
            run_step(&ctx, step)?;
        }
        Ok(())
    }
}

fn run_step(ctx: &BuildContext, step: &TestStep) -> Result<()> {
    match step {
        TestStep::Write { path, contents } => {
            write_string(&ctx.expand_path(path)?, &ctx.expand(contents)?)?;
        }
        TestStep::Run {
            run,
            env,
            path_prepend,
            expect_success,
            stdout_eq,
            stdout_contains,
            strip,
        } => {
            let argv = ctx.expand_all(run)?;
            let mut overlay = ctx.env.clone();
            for dir in path_prepend.iter().rev() {
                overlay.prepend_path("PATH", &ctx.expand(dir)?);
            }
            for (key, value) in env {
                overlay.set(key, ctx.expand(value)?);
            }

            let pb = ctx.command(&argv, &overlay)?;
            let command = pb.display_command();
            let output = pb
                .exec()
                .map_err(|e| failure(format!("`{}` could not be started", command), format!("{:#}", e)))?;
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let combined = combined_output(&output);

            if output.status.success() != *expect_success {
                return Err(failure(
                    format!(
                        "`{}` {} ({})",
                        command,
                        if *expect_success { "failed" } else { "unexpectedly succeeded" },
                        describe_status(&output.status)
                    ),
                    combined,
                ));
            }

            let actual = if *strip { stdout.trim() } else { stdout.as_str() };
            if let Some(expected) = stdout_eq {
                let expected = ctx.expand(expected)?;
                if actual != expected {
                    return Err(failure(
                        format!("`{}` printed {:?}, expected {:?}", command, actual, expected),
                        combined,
                    ));
                }
            }
            if let Some(needle) = stdout_contains {
                let needle = ctx.expand(needle)?;
                if !actual.contains(needle.as_str()) {
                    return Err(failure(
                        format!("output of `{}` does not contain {:?}", command, needle),
                        combined,
                    ));
                }
            }
        }
        TestStep::Assert {
            path,
            exists,
            executable,
        } => {
            let path = ctx.expand_path(path)?;
            if path.exists() != *exists {
                let state = if *exists { "is missing" } else { "should not exist" };
                return Err(failure(format!("{} {}", path.display(), state), ""));
            }
            if *executable && !is_executable(&path) {
                return Err(failure(format!("{} is not executable", path.display()), ""));
            }
        }
        TestStep::Which {
            program,
            expect,
            path_prepend,
        } => {
            let mut overlay = ctx.env.clone();
            for dir in path_prepend.iter().rev() {
                overlay.prepend_path("PATH", &ctx.expand(dir)?);
            }
            let expected = ctx.expand_path(expect)?;
            let found = find_executable_in(program, &overlay.search_path(), &ctx.dirs.current());
            match found {
                Some(ref found) if same_file(found, &expected) => {}
                other => {
                    return Err(failure(
                        format!(
                            "`{}` resolves to {}, expected {}",
                            program,
                            other
                                .map(|p| p.display().to_string())
                                .unwrap_or_else(|| "nothing".to_string()),
                            expected.display()
                        ),
                        overlay.search_path(),
                    ))
                }
            }
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    let canonical = |p: &Path| -> Option<PathBuf> { std::fs::canonicalize(p).ok() };
    matches!((canonical(a), canonical(b)), (Some(x), Some(y)) if x == y)
}
