//! Build steps, environment operations and smoke-test steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::dependency::Gated;

/// Extra arguments appended to a step when their gate matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalArgs {
    pub args: Vec<String>,
}

/// One external command of the build sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Anchor name for staged patches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Program and arguments
    pub run: Vec<String>,

    /// Working directory, relative to the buildpath
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Variables set for this step only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Platform-dependent arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args_when: Vec<Gated<ConditionalArgs>>,
}

/// Environment overlay operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvAction {
    Set,
    /// Append with a space
    Append,
    /// Prepend with a space
    Prepend,
    PrependPath,
    AppendPath,
    /// Append to both CFLAGS and CXXFLAGS
    AppendToCflags,
    Unset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOp {
    pub op: EnvAction,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

impl EnvOp {
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self.op {
            EnvAction::AppendToCflags => {
                if self.value.is_empty() {
                    return Err("append_to_cflags needs a value".to_string());
                }
            }
            EnvAction::Unset => {
                if self.key.is_empty() {
                    return Err("unset needs a key".to_string());
                }
            }
            _ => {
                if self.key.is_empty() {
                    return Err(format!("{:?} needs a key", self.op).to_lowercase());
                }
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// A smoke-test step run against the installed keg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TestStep {
    /// Write a file (relative paths land in the testpath)
    Write { path: String, contents: String },

    /// Run a command and check its result
    Run {
        run: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        /// Directories put in front of PATH
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path_prepend: Vec<String>,
        #[serde(default = "default_true")]
        expect_success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout_eq: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout_contains: Option<String>,
        /// Trim surrounding whitespace before comparing stdout
        #[serde(default = "default_true")]
        strip: bool,
    },

    /// Check a path in the keg or testpath
    Assert {
        path: String,
        #[serde(default = "default_true")]
        exists: bool,
        #[serde(default)]
        executable: bool,
    },

    /// Check which executable a PATH lookup finds
    Which {
        program: String,
        expect: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path_prepend: Vec<String>,
    },
}

impl TestStep {
    /// Every string of the step that undergoes template expansion.
    pub fn templated_strings(&self) -> Vec<&str> {
        match self {
            TestStep::Write { path, contents } => vec![path, contents],
            TestStep::Run {
                run,
                env,
                path_prepend,
                stdout_eq,
                stdout_contains,
                ..
            } => run
                .iter()
                .chain(env.values())
                .chain(path_prepend.iter())
                .chain(stdout_eq.iter())
                .chain(stdout_contains.iter())
                .map(String::as_str)
                .collect(),
            TestStep::Assert { path, .. } => vec![path],
            TestStep::Which {
                program,
                expect,
                path_prepend,
            } => std::iter::once(program)
                .chain(std::iter::once(expect))
                .chain(path_prepend.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}
