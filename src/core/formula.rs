//! Formula files: parsing, validation and lookup.
//!
//! A formula is a TOML document describing how to fetch, patch, build,
//! install and test one package. It is read once per invocation and never
//! modified afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::action::InstallAction;
use crate::core::dependency::{Dependency, FailsWith, Gated};
use crate::core::patch::{Patch, PatchEdit};
use crate::core::resource::{HeadSpec, Resource, SourceSpec};
use crate::core::step::{EnvOp, Step, TestStep};
use crate::core::template;
use crate::util::diagnostic::suggestions;

/// Deprecation notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    pub date: String,
    pub because: String,
}

/// The `[formula]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaMeta {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Bumped when the formula changes without a new upstream version
    #[serde(default)]
    pub revision: u32,
    /// Reason the formula is not linked into the shared prefix
    #[serde(default)]
    pub keg_only: Option<String>,
    #[serde(default)]
    pub deprecated: Option<Deprecation>,
    #[serde(default)]
    pub caveats: Option<String>,
    /// Buildpath subdirectory the primary source is staged into
    #[serde(default)]
    pub source_subdir: Option<String>,
}

/// A parsed formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Formula {
    pub formula: FormulaMeta,

    #[serde(default)]
    pub source: Option<SourceSpec>,

    #[serde(default)]
    pub head: Option<HeadSpec>,

    #[serde(default)]
    pub dependencies: Vec<Gated<Dependency>>,

    #[serde(default)]
    pub fails_with: Vec<FailsWith>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub env: Vec<Gated<EnvOp>>,

    #[serde(default)]
    pub patches: Vec<Gated<Patch>>,

    #[serde(default)]
    pub steps: Vec<Gated<Step>>,

    #[serde(default)]
    pub install: Vec<Gated<InstallAction>>,

    #[serde(default)]
    pub post_install: Vec<Gated<InstallAction>>,

    #[serde(default)]
    pub test: Vec<Gated<TestStep>>,

    /// File the formula was read from
    #[serde(skip)]
    pub path: PathBuf,
}

impl Formula {
    /// Load a formula from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read formula: {}", path.display()))?;

        Self::parse(&content, path)
    }

    /// Parse and validate formula content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut formula: Formula = toml::from_str(content)
            .with_context(|| format!("failed to parse formula: {}", path.display()))?;
        formula.path = path.to_path_buf();

        formula
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid formula {}: {}", path.display(), e))?;
        Ok(formula)
    }

    pub fn name(&self) -> &str {
        &self.formula.name
    }

    pub fn version(&self) -> &str {
        &self.formula.version
    }

    /// Version including the revision suffix, used as the keg directory
    /// name (`6.0.133_1`).
    pub fn pkg_version(&self) -> String {
        if self.formula.revision == 0 {
            self.formula.version.clone()
        } else {
            format!("{}_{}", self.formula.version, self.formula.revision)
        }
    }

    pub fn is_keg_only(&self) -> bool {
        self.formula.keg_only.is_some()
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let meta = &self.formula;
        if meta.name.is_empty()
            || !meta
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'))
        {
            return Err(format!("invalid formula name `{}`", meta.name));
        }
        if meta.version.trim().is_empty() {
            return Err("version must not be empty".to_string());
        }
        if let Some(ref source) = self.source {
            source.validate()?;
        }
        if let Some(ref caveats) = meta.caveats {
            check_template(caveats)?;
        }

        let mut resource_names = HashSet::new();
        for res in &self.resources {
            res.validate()?;
            if !resource_names.insert(res.name.as_str()) {
                return Err(format!("duplicate resource `{}`", res.name));
            }
        }

        for dep in &self.dependencies {
            dep.validate_gate()?;
            if dep.item.name == meta.name {
                return Err(format!("`{}` depends on itself", meta.name));
            }
            if dep.item.phases.is_empty() {
                return Err(format!("dependency `{}` has no phases", dep.item.name));
            }
        }

        for op in &self.env {
            op.validate_gate()?;
            op.item.validate()?;
            check_template(&op.item.value)?;
        }

        let mut step_ids = HashSet::new();
        for step in &self.steps {
            step.validate_gate()?;
            if step.item.run.is_empty() {
                return Err("step has an empty `run`".to_string());
            }
            if let Some(ref id) = step.item.id {
                if !step_ids.insert(id.as_str()) {
                    return Err(format!("duplicate step id `{}`", id));
                }
            }
            for arg in step.item.run.iter().chain(step.item.cwd.iter()) {
                check_template(arg)?;
            }
            for value in step.item.env.values() {
                check_template(value)?;
            }
            for extra in &step.item.args_when {
                extra.validate_gate()?;
                for arg in &extra.item.args {
                    check_template(arg)?;
                }
            }
        }

        for patch in &self.patches {
            patch.validate_gate()?;
            patch.item.validate()?;
            if let Some(ref stage) = patch.item.stage {
                if !step_ids.contains(stage.as_str()) {
                    return Err(format!("patch `{}` is staged on unknown step `{}`", patch.item.describe(), stage));
                }
            }
            if let PatchEdit::Diff {
                resource: Some(ref name),
                ..
            } = patch.item.edit
            {
                if !resource_names.contains(name.as_str()) {
                    return Err(format!("patch references unknown resource `{}`", name));
                }
            }
        }

        for action in self.install.iter().chain(self.post_install.iter()) {
            action.validate_gate()?;
            for s in action.item.templated_strings() {
                check_template(s)?;
            }
            if let InstallAction::Bootstrap(ref spec) = action.item {
                if !resource_names.contains(spec.resource.as_str()) {
                    return Err(format!("bootstrap references unknown resource `{}`", spec.resource));
                }
            }
        }

        for step in &self.test {
            step.validate_gate()?;
            for s in step.item.templated_strings() {
                check_template(s)?;
            }
        }

        Ok(())
    }
}

fn check_template(input: &str) -> std::result::Result<(), String> {
    template::validate(input)
}

/// Locate a formula by name or path.
///
/// A value ending in `.toml` (or naming an existing file) is used as a
/// path. Otherwise each directory is searched for `<name>.toml` and
/// `<first letter>/<name>.toml`.
pub fn find_formula(name_or_path: &str, dirs: &[PathBuf]) -> Result<PathBuf> {
    let as_path = Path::new(name_or_path);
    if name_or_path.ends_with(".toml") || as_path.is_file() {
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }
        bail!("formula file not found: {}", as_path.display());
    }

    let file = format!("{}.toml", name_or_path);
    let first = name_or_path.chars().next().map(|c| c.to_ascii_lowercase().to_string());

    for dir in dirs {
        let flat = dir.join(&file);
        if flat.is_file() {
            return Ok(flat);
        }
        if let Some(ref letter) = first {
            let sharded = dir.join(letter).join(&file);
            if sharded.is_file() {
                return Ok(sharded);
            }
        }
    }

    bail!(
        "no formula named `{}` in {}\nhint: {}",
        name_or_path,
        dirs.iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        suggestions::FORMULA_NOT_FOUND
    )
}

/// Split a version into its numeric components for `{version.major}` and
/// friends.
pub fn version_part(version: &str, parts: usize) -> String {
    version
        .split(['.', '-', '+'])
        .take(parts)
        .collect::<Vec<_>>()
        .join(".")
}
