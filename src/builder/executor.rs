//! Build step executor with progress reporting.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::context::BuildContext;
use crate::builder::patch::PatchApplier;
use crate::builder::plan::{BuildPlan, PlannedStep};
use crate::error::{describe_status, PipelineError};
use crate::util::process::combined_output;

/// Runs the planned build steps in order.
///
/// Patches are consumed exactly once: the unanchored ones before the first
/// step, staged ones right before their step. The first failing command
/// stops the sequence.
pub struct BuildExecutor<'a> {
    ctx: &'a BuildContext,
    verbose: bool,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        BuildExecutor {
            ctx,
            verbose: ctx.verbose,
        }
    }

    /// Enable verbose output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn execute(&self, plan: &BuildPlan) -> Result<()> {
        let start = Instant::now();
        let applier = PatchApplier::new(self.ctx);

        if !plan.patches.is_empty() {
            eprintln!("    Patching {} file(s)", plan.patches.len());
        }
        applier.apply_all(&plan.patches)?;

        for step in &plan.steps {
            applier.apply_all(&step.patches)?;
            self.run_step(step)?;
        }

        eprintln!(
            "    Finished {} step(s) in {:.2}s",
            plan.steps.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn run_step(&self, step: &PlannedStep) -> Result<()> {
        let ctx = self.ctx;
        let mut argv = ctx.expand_all(&step.argv)?;
        insert_jobs_flag(&mut argv, ctx.layout.jobs);

        let _guard = match step.cwd {
            Some(ref cwd) => Some(ctx.dirs.push(ctx.expand(cwd)?)),
            None => None,
        };

        let mut env = ctx.env.clone();
        for (key, value) in &step.env {
            env.set(key, ctx.expand(value)?);
        }

        let pb = ctx.command(&argv, &env)?;
        let command = pb.display_command();
        let cwd = ctx.dirs.current();
        let build_error = |status: String, output: String| -> anyhow::Error {
            PipelineError::Build {
                command: command.clone(),
                cwd: cwd.clone(),
                status,
                output,
            }
            .into()
        };

        if self.verbose {
            eprintln!("     Running `{}`", command);
            let status = pb
                .status()
                .map_err(|e| build_error(format!("failed to start: {:#}", e), String::new()))?;
            if !status.success() {
                return Err(build_error(describe_status(&status), String::new()));
            }
            return Ok(());
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
            spinner.set_style(style);
        }
        spinner.set_message(step_label(step, &argv));
        spinner.enable_steady_tick(Duration::from_millis(120));

        let result = pb.exec();
        spinner.finish_and_clear();

        let output = result.map_err(|e| build_error(format!("failed to start: {:#}", e), String::new()))?;
        tracing::debug!("`{}` exited with {}", command, describe_status(&output.status));
        if !output.status.success() {
            return Err(build_error(describe_status(&output.status), combined_output(&output)));
        }
        Ok(())
    }
}

fn step_label(step: &PlannedStep, argv: &[String]) -> String {
    match step.id {
        Some(ref id) => format!("Building ({})", id),
        None => format!("Running {}", argv.first().map(String::as_str).unwrap_or("")),
    }
}

/// Pass `-j<jobs>` to make unless the step already sets a job count.
fn insert_jobs_flag(argv: &mut Vec<String>, jobs: Option<usize>) {
    let Some(jobs) = jobs else { return };
    let is_make = argv
        .first()
        .and_then(|p| Path::new(p).file_name())
        .is_some_and(|name| name == "make" || name == "gmake");
    if is_make && !argv.iter().skip(1).any(|a| a.starts_with("-j")) {
        argv.insert(1, format!("-j{}", jobs));
    }
}
