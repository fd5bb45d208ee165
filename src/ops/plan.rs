//! Implementation of `keg plan`, plus the formula loading shared by the
//! other operations.

use anyhow::Result;

use crate::builder::plan::BuildPlan;
use crate::core::formula::{find_formula, Formula};
use crate::core::platform::{BuildMode, Platform};
use crate::util::GlobalContext;

/// Find and parse a formula by name or path.
pub fn load_formula(gctx: &GlobalContext, name_or_path: &str) -> Result<Formula> {
    let path = find_formula(name_or_path, &gctx.formula_dirs())?;
    tracing::debug!("loading formula from {}", path.display());
    Formula::load(&path)
}

/// The host platform with configured overrides and the requested mode.
pub fn host_platform(gctx: &GlobalContext, mode: BuildMode) -> Platform {
    Platform::detect(&gctx.config().platform).with_mode(mode)
}

/// Load `name_or_path` and evaluate it for the host.
pub fn plan_formula(
    gctx: &GlobalContext,
    name_or_path: &str,
    mode: BuildMode,
) -> Result<(Formula, BuildPlan)> {
    let formula = load_formula(gctx, name_or_path)?;
    let platform = host_platform(gctx, mode);
    let plan = BuildPlan::evaluate(&formula, &platform)?;
    Ok((formula, plan))
}

/// Options for the plan command.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub mode: BuildMode,
    /// Emit JSON instead of a summary
    pub json: bool,
}

/// Render the plan for `name_or_path`.
pub fn plan(gctx: &GlobalContext, name_or_path: &str, opts: &PlanOptions) -> Result<String> {
    let (_, plan) = plan_formula(gctx, name_or_path, opts.mode)?;
    if opts.json {
        plan.to_json()
    } else {
        Ok(format_plan(&plan))
    }
}

/// Human-readable plan summary.
pub fn format_plan(plan: &BuildPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} for {}\n",
        plan.formula,
        plan.pkg_version,
        plan.platform.describe()
    ));

    if let Some(ref source) = plan.source {
        out.push_str(&format!("source: {}\n", source.url()));
    }

    if !plan.dependencies.is_empty() {
        out.push_str("dependencies:\n");
        for dep in &plan.dependencies {
            let phases: Vec<String> = dep.phases.iter().map(|p| p.to_string()).collect();
            out.push_str(&format!("  {} ({})\n", dep.name, phases.join(", ")));
        }
    }

    if !plan.resources.is_empty() {
        out.push_str("resources:\n");
        for resource in &plan.resources {
            out.push_str(&format!("  {} {}\n", resource.name, resource.url));
        }
    }

    if !plan.patches.is_empty() {
        out.push_str("patches:\n");
        for patch in &plan.patches {
            out.push_str(&format!("  {}\n", patch.describe()));
        }
    }

    out.push_str("steps:\n");
    for step in &plan.steps {
        for patch in &step.patches {
            out.push_str(&format!("  (patch) {}\n", patch.describe()));
        }
        out.push_str(&format!("  {}\n", step.argv.join(" ")));
    }

    out.push_str(&format!(
        "install: {} action(s), post-install: {}, tests: {}\n",
        plan.install.len(),
        plan.post_install.len(),
        plan.tests.len()
    ));
    if plan.keg_only {
        out.push_str("keg-only\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dependency, formula, sh_step, Sandbox};

    #[test]
    fn test_plan_json_drops_gated_dependency() {
        let sb = Sandbox::new();
        let other_os = if cfg!(target_os = "macos") { "linux" } else { "macos" };
        let path = sb.write_formula(
            "app",
            &formula(
                "app",
                "1.0",
                &format!(
                    "{}{}{}",
                    dependency("zlib", ""),
                    dependency("gated", &format!("when = {{ os = \"{}\" }}", other_os)),
                    sh_step("build", "make")
                ),
            ),
        );

        let json = plan(
            &sb.gctx(),
            path.to_str().unwrap(),
            &PlanOptions {
                json: true,
                ..Default::default()
            },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let deps = value["dependencies"].as_array().unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0]["name"], "zlib");
        assert_eq!(value["steps"][0]["id"], "build");
    }

    #[test]
    fn test_format_plan_lists_steps() {
        let sb = Sandbox::new();
        let path = sb.write_formula(
            "app",
            &formula("app", "2.1", &sh_step("build", "echo hi")),
        );
        let text = plan(&sb.gctx(), path.to_str().unwrap(), &PlanOptions::default()).unwrap();
        assert!(text.starts_with("app 2.1 for "));
        assert!(text.contains("  sh -c echo hi\n"));
    }

    #[test]
    fn test_head_without_head_source_is_plan_error() {
        let sb = Sandbox::new();
        let path = sb.write_formula("app", &formula("app", "1.0", ""));
        let mode = BuildMode {
            head: true,
            bottle: false,
        };
        let err = plan_formula(&sb.gctx(), path.to_str().unwrap(), mode).unwrap_err();
        let pipeline = err.downcast_ref::<crate::error::PipelineError>().unwrap();
        assert_eq!(pipeline.exit_code(), 10);
    }

    fn bundled(name: &str, content: &str) -> Formula {
        Formula::parse(content, std::path::Path::new(name)).unwrap()
    }

    #[test]
    fn test_bundled_node_plans_per_platform() {
        let node = bundled("node.toml", include_str!("../../formulae/node.toml"));

        let linux = BuildPlan::evaluate(&node, &Platform::new("linux", "x86_64")).unwrap();
        let names: Vec<&str> = linux.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"zlib"));
        assert!(names.contains(&"python"));
        assert!(!names.contains(&"llvm"));
        assert!(!linux.steps[0].argv.contains(&"--enable-lto".to_string()));

        let mac = Platform::new("macos", "aarch64")
            .with_os_version("14.4")
            .with_compiler("clang", Some(1500))
            .with_mode(BuildMode {
                bottle: true,
                head: false,
            });
        let mac = BuildPlan::evaluate(&node, &mac).unwrap();
        let names: Vec<&str> = mac.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert!(!names.contains(&"zlib"));
        assert!(!names.contains(&"python"));
        assert!(mac.steps[0].argv.contains(&"--enable-lto".to_string()));
        assert!(mac.env.iter().any(|op| op.value == "-Wl,-ld_classic"));

        let catalina = Platform::new("macos", "x86_64")
            .with_os_version("10.15")
            .with_compiler("clang", Some(1100));
        let catalina = BuildPlan::evaluate(&node, &catalina).unwrap();
        assert_eq!(catalina.platform.compiler.as_ref().unwrap().family, "llvm");
        assert!(catalina.dependencies.iter().any(|d| d.name == "llvm"));
        let cc = catalina.env.iter().find(|op| op.key == "CC").unwrap();
        assert_eq!(cc.value, "{dep:llvm.opt_bin}/clang");
        assert!(!catalina.env.iter().any(|op| op.value == "-Wl,-ld_classic"));
    }

    #[test]
    fn test_bundled_dotnet_stages_patches_on_prep() {
        let dotnet = bundled("dotnet@6.toml", include_str!("../../formulae/dotnet@6.toml"));
        assert_eq!(dotnet.pkg_version(), "6.0.133_1");
        assert!(dotnet.is_keg_only());

        let linux = BuildPlan::evaluate(&dotnet, &Platform::new("linux", "x86_64")).unwrap();
        let prep = linux.steps.iter().find(|s| s.id.as_deref() == Some("prep")).unwrap();
        assert_eq!(prep.argv, vec!["./prep.sh".to_string()]);
        assert_eq!(prep.patches.len(), 3);
        assert_eq!(linux.patches.len(), 2);

        let mac = Platform::new("macos", "aarch64").with_case_insensitive_fs(true);
        let mac = BuildPlan::evaluate(&dotnet, &mac).unwrap();
        let prep = mac.steps.iter().find(|s| s.id.as_deref() == Some("prep")).unwrap();
        assert_eq!(prep.argv, vec!["./prep.sh".to_string(), "--bootstrap".to_string()]);
        assert_eq!(prep.patches.len(), 5);
        assert!(!mac.dependencies.iter().any(|d| d.name == "libunwind"));

        // gcc hosts build with the llvm keg, or with clang when installed
        let gcc = Platform::new("linux", "x86_64").with_compiler("gcc", None);
        let plan = BuildPlan::evaluate(&dotnet, &gcc).unwrap();
        assert_eq!(plan.platform.compiler.as_ref().unwrap().family, "llvm");
        assert_eq!(plan.env[0].value, "{dep:llvm.opt_bin}/clang");

        let plan = BuildPlan::evaluate(&dotnet, &gcc.with_alternate_compiler("clang")).unwrap();
        assert_eq!(plan.platform.compiler.as_ref().unwrap().family, "clang");
        assert_eq!(plan.env[1].value, "clang++");
    }
}
