//! Build plan evaluation.
//!
//! A BuildPlan is a formula with every `when` / `unless` gate evaluated
//! against one platform. Nothing downstream looks at conditions again:
//! the executor, installer and verifier only ever see the concrete plan.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;

use crate::core::dependency::{Dependency, Gated, Phase};
use crate::core::formula::{Deprecation, Formula};
use crate::core::patch::Patch;
use crate::core::platform::{Compiler, Platform};
use crate::core::resource::{Resource, SourceSpec};
use crate::core::step::{EnvAction, EnvOp, TestStep};
use crate::core::template::referenced_deps;
use crate::core::InstallAction;
use crate::error::PipelineError;

/// Platform family the plan was evaluated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanTarget {
    MacOs { version: Option<String> },
    Linux,
    Other { os: String },
}

impl PlanTarget {
    pub fn for_platform(platform: &Platform) -> Self {
        match platform.os.as_str() {
            "macos" => PlanTarget::MacOs {
                version: platform.os_version.clone(),
            },
            "linux" => PlanTarget::Linux,
            other => PlanTarget::Other {
                os: other.to_string(),
            },
        }
    }
}

/// A build step with its conditional arguments folded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Program followed by its arguments (unexpanded templates)
    pub argv: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Patches applied immediately before this step
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
}

/// A concrete, platform-specific plan.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub formula: String,
    pub version: String,
    /// Keg directory name
    pub pkg_version: String,
    pub target: PlanTarget,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_subdir: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub resources: Vec<Resource>,
    pub env: Vec<EnvOp>,
    /// Patches applied before the first step
    pub patches: Vec<Patch>,
    pub steps: Vec<PlannedStep>,
    pub install: Vec<InstallAction>,
    pub post_install: Vec<InstallAction>,
    pub tests: Vec<TestStep>,
    pub keg_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caveats: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecation>,
}

fn active<'a, T>(items: &'a [Gated<T>], platform: &'a Platform) -> impl Iterator<Item = &'a T> {
    items
        .iter()
        .filter(move |g| g.applies_to(platform))
        .map(|g| &g.item)
}

impl BuildPlan {
    /// Evaluate `formula` for a build on `platform`.
    ///
    /// When a `fails_with` entry rejects the host compiler the plan
    /// switches to another one and sets `CC` / `CXX` for it.
    pub fn evaluate(formula: &Formula, platform: &Platform) -> Result<Self, PipelineError> {
        let plan_error = |message: String| PipelineError::Plan {
            formula: formula.name().to_string(),
            message,
        };

        match select_compiler(formula, platform).map_err(plan_error)? {
            Some(compiler) => {
                tracing::info!(
                    "{} does not build with {}, using {}",
                    formula.name(),
                    platform.compiler.as_ref().map_or("", |c| c.family.as_str()),
                    compiler.family
                );
                let mut switched = platform.clone();
                switched.compiler = Some(compiler.clone());
                let mut plan = Self::evaluate_gates(formula, &switched)?;
                let mut env = compiler_env(&compiler);
                env.append(&mut plan.env);
                plan.env = env;
                plan.check_dependency_references().map_err(plan_error)?;
                Ok(plan)
            }
            None => Self::evaluate_gates(formula, platform),
        }
    }

    /// Evaluate `formula` for a keg that is already built. Compiler
    /// restrictions do not apply.
    pub fn evaluate_installed(formula: &Formula, platform: &Platform) -> Result<Self, PipelineError> {
        Self::evaluate_gates(formula, platform)
    }

    fn evaluate_gates(formula: &Formula, platform: &Platform) -> Result<Self, PipelineError> {
        let name = formula.name().to_string();
        let plan_error = |message: String| PipelineError::Plan {
            formula: name.clone(),
            message,
        };

        let source = if platform.mode.head {
            match formula.head {
                Some(ref head) => Some(head.to_source()),
                None => return Err(plan_error("no head source is declared".to_string())),
            }
        } else {
            formula.source.clone()
        };

        let dependencies: Vec<Dependency> = active(&formula.dependencies, platform).cloned().collect();
        let env: Vec<EnvOp> = active(&formula.env, platform).cloned().collect();

        let mut steps = Vec::new();
        for step in active(&formula.steps, platform) {
            let mut argv = step.run.clone();
            for extra in active(&step.args_when, platform) {
                argv.extend(extra.args.iter().cloned());
            }
            steps.push(PlannedStep {
                id: step.id.clone(),
                argv,
                cwd: step.cwd.clone(),
                env: step.env.clone(),
                patches: Vec::new(),
            });
        }

        let mut patches = Vec::new();
        for patch in active(&formula.patches, platform) {
            match patch.stage {
                None => patches.push(patch.clone()),
                Some(ref stage) => {
                    let anchor = steps
                        .iter_mut()
                        .find(|s| s.id.as_deref() == Some(stage.as_str()))
                        .ok_or_else(|| {
                            plan_error(format!(
                                "patch `{}` is staged on step `{}`, which does not run on {}",
                                patch.describe(),
                                stage,
                                platform.describe()
                            ))
                        })?;
                    anchor.patches.push(patch.clone());
                }
            }
        }

        let install: Vec<InstallAction> = active(&formula.install, platform).cloned().collect();
        let post_install: Vec<InstallAction> =
            active(&formula.post_install, platform).cloned().collect();
        let tests: Vec<TestStep> = active(&formula.test, platform).cloned().collect();

        let plan = BuildPlan {
            formula: name.clone(),
            version: formula.version().to_string(),
            pkg_version: formula.pkg_version(),
            target: PlanTarget::for_platform(platform),
            platform: platform.clone(),
            source,
            source_subdir: formula.formula.source_subdir.clone(),
            dependencies,
            resources: formula.resources.clone(),
            env,
            patches,
            steps,
            install,
            post_install,
            tests,
            keg_only: formula.is_keg_only(),
            caveats: formula.formula.caveats.clone(),
            deprecated: formula.formula.deprecated.clone(),
        };

        plan.check_dependency_references().map_err(plan_error)?;
        Ok(plan)
    }

    /// A plan with no work in it.
    pub fn empty(formula: &str, version: &str, platform: &Platform) -> Self {
        BuildPlan {
            formula: formula.to_string(),
            version: version.to_string(),
            pkg_version: version.to_string(),
            target: PlanTarget::for_platform(platform),
            platform: platform.clone(),
            source: None,
            source_subdir: None,
            dependencies: Vec::new(),
            resources: Vec::new(),
            env: Vec::new(),
            patches: Vec::new(),
            steps: Vec::new(),
            install: Vec::new(),
            post_install: Vec::new(),
            tests: Vec::new(),
            keg_only: false,
            caveats: None,
            deprecated: None,
        }
    }

    /// Dependencies needed in any of `phases`.
    pub fn dependencies_for(&self, phases: &[Phase]) -> Vec<&Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.needed_in(phases))
            .collect()
    }

    /// Total number of patches in the plan.
    pub fn patch_count(&self) -> usize {
        self.patches.len() + self.steps.iter().map(|s| s.patches.len()).sum::<usize>()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // A `{dep:..}` placeholder may only name a dependency that survived
    // platform filtering.
    fn check_dependency_references(&self) -> Result<(), String> {
        let known: BTreeSet<&str> = self.dependencies.iter().map(|d| d.name.as_str()).collect();

        let mut strings: Vec<&str> = Vec::new();
        strings.extend(self.env.iter().map(|e| e.value.as_str()));
        for step in &self.steps {
            strings.extend(step.argv.iter().map(String::as_str));
            strings.extend(step.cwd.iter().map(String::as_str));
            strings.extend(step.env.values().map(String::as_str));
        }
        for action in self.install.iter().chain(self.post_install.iter()) {
            strings.extend(action.templated_strings());
        }
        for test in &self.tests {
            strings.extend(test.templated_strings());
        }

        for s in strings {
            for dep in referenced_deps(s) {
                if !known.contains(dep.as_str()) {
                    return Err(format!(
                        "`{}` refers to `{}`, which is not a dependency on this platform",
                        s, dep
                    ));
                }
            }
        }
        Ok(())
    }
}


/// Compiler family provided by the `llvm` formula.
const LLVM: &str = "llvm";

/// Pick a replacement for the host compiler, if a `fails_with` entry
/// rejects it. Other host compilers are tried first, then the `llvm` keg
/// when the formula depends on it on this platform.
fn select_compiler(formula: &Formula, platform: &Platform) -> Result<Option<Compiler>, String> {
    let Some(ref host) = platform.compiler else {
        return Ok(None);
    };
    let rejected_by = |compiler: &Compiler| formula.fails_with.iter().find(|fw| fw.rejects(compiler));
    let Some(reason) = rejected_by(host) else {
        return Ok(None);
    };

    let mut candidates: Vec<Compiler> = platform
        .alternate_compilers
        .iter()
        .map(|family| Compiler {
            family: family.clone(),
            build: None,
        })
        .collect();
    if active(&formula.dependencies, platform).any(|d| d.name == LLVM) {
        candidates.push(Compiler {
            family: LLVM.to_string(),
            build: None,
        });
    }

    if let Some(found) = candidates.into_iter().find(|c| rejected_by(c).is_none()) {
        return Ok(Some(found));
    }

    let mut message = format!(
        "does not build with {}{} and no other compiler is available",
        reason.compiler,
        reason
            .build_max
            .map(|b| format!(" (build {} or older)", b))
            .unwrap_or_default()
    );
    if let Some(ref cause) = reason.cause {
        message.push_str(&format!(": {}", cause));
    }
    Err(message)
}

fn compiler_env(compiler: &Compiler) -> Vec<EnvOp> {
    let (cc, cxx) = match compiler.family.as_str() {
        LLVM => (
            "{dep:llvm.opt_bin}/clang".to_string(),
            "{dep:llvm.opt_bin}/clang++".to_string(),
        ),
        "gcc" => ("gcc".to_string(), "g++".to_string()),
        other => (other.to_string(), format!("{}++", other)),
    };
    [("CC", cc), ("CXX", cxx)]
        .into_iter()
        .map(|(key, value)| EnvOp {
            op: EnvAction::Set,
            key: key.to_string(),
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::BuildMode;
    use std::path::Path;

    const FORMULA: &str = r#"
[formula]
name = "node"
version = "23.6.1"

[source]
url = "https://nodejs.org/dist/v23.6.1/node-v23.6.1.tar.xz"
sha256 = "0d0a3e0a2a3a3f4fdbdba1e6e5a3b2c6a2f5d1e0c9b8a7f6e5d4c3b2a1f0e9d8"

[head]
git = "https://github.com/nodejs/node.git"

[[dependencies]]
name = "pkgconf"
phases = ["build"]

[[dependencies]]
name = "libuv"

[[dependencies]]
name = "python"
phases = ["build"]
unless = { os = "macos" }

[[patches]]
file = "configure"
edit = "replace"
from = "old"
to = "new"

[[patches]]
file = "Makefile"
edit = "replace"
from = "a"
to = "b"
stage = "make"

[[steps]]
id = "configure"
run = ["./configure", "--prefix={prefix}", "--shared-libuv-libpath={dep:libuv.opt_lib}"]
args_when = [
  { args = ["--enable-lto"], when = { os = "macos", os_version_min = "13", bottle = true } },
]

[[steps]]
id = "make"
run = ["make", "install"]
"#;

    fn formula() -> Formula {
        Formula::parse(FORMULA, Path::new("node.toml")).unwrap()
    }

    #[test]
    fn test_gated_dependency_absent() {
        let mac = Platform::new("macos", "aarch64").with_os_version("14.4");
        let plan = BuildPlan::evaluate(&formula(), &mac).unwrap();
        let names: Vec<_> = plan.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["pkgconf", "libuv"]);
        assert_eq!(plan.target, PlanTarget::MacOs { version: Some("14.4".into()) });

        let linux = Platform::new("linux", "x86_64");
        let plan = BuildPlan::evaluate(&formula(), &linux).unwrap();
        assert_eq!(plan.dependencies.len(), 3);
        assert_eq!(plan.target, PlanTarget::Linux);
    }

    #[test]
    fn test_conditional_args_folded() {
        let mac = Platform::new("macos", "aarch64").with_os_version("14.4");
        let plan = BuildPlan::evaluate(&formula(), &mac).unwrap();
        assert!(!plan.steps[0].argv.contains(&"--enable-lto".to_string()));

        let bottle = mac.with_mode(BuildMode {
            bottle: true,
            head: false,
        });
        let plan = BuildPlan::evaluate(&formula(), &bottle).unwrap();
        assert_eq!(plan.steps[0].argv.last().unwrap(), "--enable-lto");
    }

    #[test]
    fn test_patches_partitioned_by_stage() {
        let plan = BuildPlan::evaluate(&formula(), &Platform::new("linux", "x86_64")).unwrap();
        assert_eq!(plan.patches.len(), 1);
        assert!(plan.steps[0].patches.is_empty());
        assert_eq!(plan.steps[1].patches.len(), 1);
        assert_eq!(plan.patch_count(), 2);
    }

    #[test]
    fn test_head_source() {
        let head = Platform::new("linux", "x86_64").with_mode(BuildMode {
            bottle: false,
            head: true,
        });
        let plan = BuildPlan::evaluate(&formula(), &head).unwrap();
        assert!(matches!(plan.source, Some(SourceSpec::Git { .. })));
    }

    #[test]
    fn test_dependencies_for_phase() {
        let plan = BuildPlan::evaluate(&formula(), &Platform::new("linux", "x86_64")).unwrap();
        let test_deps: Vec<_> = plan
            .dependencies_for(&[Phase::Test])
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(test_deps, vec!["libuv"]);
    }

    #[test]
    fn test_fails_with_switches_compiler() {
        let content = format!(
            "{}\n[[fails_with]]\ncompiler = \"clang\"\nbuild_max = 1100\n",
            FORMULA
        );
        let formula = Formula::parse(&content, Path::new("node.toml")).unwrap();

        let old_clang = Platform::new("linux", "x86_64")
            .with_compiler("clang", Some(1100))
            .with_alternate_compiler("gcc");
        let plan = BuildPlan::evaluate(&formula, &old_clang).unwrap();
        assert_eq!(plan.platform.compiler.as_ref().unwrap().family, "gcc");
        assert_eq!(plan.env[0].key, "CC");
        assert_eq!(plan.env[0].value, "gcc");
        assert_eq!(plan.env[1].value, "g++");

        let new_clang = Platform::new("linux", "x86_64").with_compiler("clang", Some(1500));
        let plan = BuildPlan::evaluate(&formula, &new_clang).unwrap();
        assert_eq!(plan.platform.compiler.as_ref().unwrap().family, "clang");
        assert!(plan.env.is_empty());
    }

    #[test]
    fn test_fails_with_without_alternative() {
        let content = format!(
            "{}\n[[fails_with]]\ncompiler = \"clang\"\nbuild_max = 1100\n",
            FORMULA
        );
        let formula = Formula::parse(&content, Path::new("node.toml")).unwrap();
        let old_clang = Platform::new("macos", "x86_64").with_compiler("clang", Some(1100));

        let err = BuildPlan::evaluate(&formula, &old_clang).unwrap_err();
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("no other compiler is available"));

        // an existing keg can still be tested and checked
        let plan = BuildPlan::evaluate_installed(&formula, &old_clang).unwrap();
        assert_eq!(plan.platform.compiler.as_ref().unwrap().family, "clang");
    }

    #[test]
    fn test_reference_to_gated_out_dependency() {
        let content = FORMULA.replace(
            "run = [\"make\", \"install\"]",
            "run = [\"make\", \"PYTHON={dep:python.opt_bin}/python3\"]",
        );
        let formula = Formula::parse(&content, Path::new("node.toml")).unwrap();
        assert!(BuildPlan::evaluate(&formula, &Platform::new("linux", "x86_64")).is_ok());

        let mac = Platform::new("macos", "aarch64");
        let err = BuildPlan::evaluate(&formula, &mac).unwrap_err();
        assert!(err.to_string().contains("not a dependency on this platform"));
    }

    #[test]
    fn test_plan_serializes() {
        let plan = BuildPlan::evaluate(&formula(), &Platform::new("linux", "x86_64")).unwrap();
        let json = plan.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["target"]["kind"], "linux");
        assert_eq!(value["steps"][1]["patches"][0]["edit"], "replace");
    }
}
