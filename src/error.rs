//! Fatal pipeline errors.
//!
//! Each stage of an install has its own error class so the operator can
//! tell from the exit code and the log which stage failed. None of them
//! are retried.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// A fatal error raised by one stage of the build pipeline.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum PipelineError {
    #[error("cannot plan `{formula}`: {message}")]
    #[diagnostic(code(keg::plan))]
    Plan { formula: String, message: String },

    #[error("unresolved dependencies for `{formula}`: {}", missing.join(", "))]
    #[diagnostic(code(keg::resolve::missing), help("install missing dependencies first"))]
    Resolution {
        formula: String,
        missing: Vec<String>,
    },

    #[error("checksum mismatch for `{resource}`")]
    #[diagnostic(code(keg::fetch::integrity))]
    Integrity {
        resource: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("patch failed for {}: {reason}", path.display())]
    #[diagnostic(code(keg::patch))]
    Patch {
        path: PathBuf,
        reason: String,
        output: String,
    },

    #[error("`{command}` failed ({status})")]
    #[diagnostic(code(keg::build))]
    Build {
        command: String,
        cwd: PathBuf,
        status: String,
        output: String,
    },

    #[error("verification failed: {message}")]
    #[diagnostic(code(keg::verify))]
    Verification { message: String, output: String },
}

impl PipelineError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Plan { .. } => 10,
            PipelineError::Resolution { .. } => 11,
            PipelineError::Integrity { .. } => 12,
            PipelineError::Patch { .. } => 13,
            PipelineError::Build { .. } => 14,
            PipelineError::Verification { .. } => 15,
        }
    }

    /// Short stage label used in logs.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Plan { .. } => "plan",
            PipelineError::Resolution { .. } => "resolve",
            PipelineError::Integrity { .. } => "fetch",
            PipelineError::Patch { .. } => "patch",
            PipelineError::Build { .. } => "build",
            PipelineError::Verification { .. } => "verify",
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(format!("[{}] {}", self.stage(), self));
        match self {
            PipelineError::Plan { .. } => diag,
            PipelineError::Resolution { missing, .. } => {
                let mut diag = diag;
                for name in missing {
                    diag = diag.with_context(format!("`{}` is not installed", name));
                }
                diag.with_suggestion(suggestions::MISSING_DEPENDENCY)
            }
            PipelineError::Integrity {
                url,
                expected,
                actual,
                ..
            } => diag
                .with_context(format!("url:      {}", url))
                .with_context(format!("expected: {}", expected))
                .with_context(format!("actual:   {}", actual))
                .with_suggestion(suggestions::INTEGRITY),
            PipelineError::Patch { path, output, .. } => diag
                .with_location(path)
                .with_output(output.clone())
                .with_suggestion(suggestions::PATCH_FAILED),
            PipelineError::Build { cwd, output, .. } => diag
                .with_context(format!("in {}", cwd.display()))
                .with_output(output.clone())
                .with_suggestion(suggestions::BUILD_FAILED),
            PipelineError::Verification { output, .. } => diag
                .with_output(output.clone())
                .with_suggestion(suggestions::VERIFY_FAILED),
        }
    }
}

/// Describe a process exit status for messages.
pub fn describe_status(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
