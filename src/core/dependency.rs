//! Dependency declarations.
//!
//! A dependency names another formula that must already be installed,
//! the phases it is needed in, and an optional platform gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::platform::{gate_allows, Compiler, Condition, Platform};

/// When a dependency is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Only while building
    Build,
    /// While building and at run time
    Run,
    /// Only while running the smoke test
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Build => write!(f, "build"),
            Phase::Run => write!(f, "run"),
            Phase::Test => write!(f, "test"),
        }
    }
}

fn default_phases() -> Vec<Phase> {
    vec![Phase::Run]
}

/// A declared dependency on another formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Formula name
    pub name: String,

    /// Phases the dependency is required in
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, phases: &[Phase]) -> Self {
        Dependency {
            name: name.into(),
            phases: phases.to_vec(),
        }
    }

    /// Whether this dependency is needed in any of `phases`.
    ///
    /// Run-time dependencies are also needed while building and testing.
    pub fn needed_in(&self, phases: &[Phase]) -> bool {
        self.phases
            .iter()
            .any(|p| phases.contains(p) || *p == Phase::Run)
    }
}

/// Wraps a formula item with its `when` / `unless` platform gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gated<T> {
    #[serde(flatten)]
    pub item: T,

    /// Condition that must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,

    /// Condition that must not match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<Condition>,
}

impl<T> Gated<T> {
    pub fn always(item: T) -> Self {
        Gated {
            item,
            when: None,
            unless: None,
        }
    }

    /// Whether the item is active on `platform`.
    pub fn applies_to(&self, platform: &Platform) -> bool {
        gate_allows(self.when.as_ref(), self.unless.as_ref(), platform)
    }

    /// Validate both conditions.
    pub fn validate_gate(&self) -> Result<(), String> {
        if let Some(ref c) = self.when {
            c.validate()?;
        }
        if let Some(ref c) = self.unless {
            c.validate()?;
        }
        Ok(())
    }
}

/// A compiler a formula is known not to build with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailsWith {
    /// Compiler family
    pub compiler: String,

    /// Highest failing build number; all builds fail when absent
    #[serde(default)]
    pub build_max: Option<u32>,

    /// Why the compiler is rejected
    #[serde(default)]
    pub cause: Option<String>,
}

impl FailsWith {
    /// Check whether the platform's compiler is affected.
    pub fn matches(&self, platform: &Platform) -> bool {
        platform.compiler.as_ref().is_some_and(|c| self.rejects(c))
    }

    pub fn rejects(&self, compiler: &Compiler) -> bool {
        if compiler.family != self.compiler {
            return false;
        }
        match (self.build_max, compiler.build) {
            (None, _) => true,
            (Some(max), Some(build)) => build <= max,
            (Some(_), None) => false,
        }
    }
}
