//! Implementation of `keg info`.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::dependency::Phase;
use crate::core::formula::Formula;
use crate::core::platform::{BuildMode, Platform};
use crate::core::registry::{Cellar, PackageRegistry};
use crate::ops::plan::{host_platform, load_formula};
use crate::util::GlobalContext;

/// A declared dependency and its state on this host.
#[derive(Debug, Clone)]
pub struct DependencyInfo {
    pub name: String,
    pub phases: Vec<Phase>,
    /// False when the platform gate excludes it
    pub applies: bool,
    pub installed: Option<String>,
}

/// What `keg info` shows about a formula.
#[derive(Debug, Clone)]
pub struct FormulaInfo {
    pub name: String,
    pub pkg_version: String,
    pub desc: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub keg_only: Option<String>,
    pub deprecated: Option<String>,
    pub path: PathBuf,
    pub dependencies: Vec<DependencyInfo>,
    /// `(name, version)` of each resource
    pub resources: Vec<(String, Option<String>)>,
    /// Installed versions, oldest first
    pub installed: Vec<String>,
}

pub fn info(gctx: &GlobalContext, name_or_path: &str) -> Result<FormulaInfo> {
    let formula = load_formula(gctx, name_or_path)?;
    let platform = host_platform(gctx, BuildMode::default());
    formula_info(gctx, &formula, &platform)
}

pub fn formula_info(gctx: &GlobalContext, formula: &Formula, platform: &Platform) -> Result<FormulaInfo> {
    let cellar = Cellar::new(gctx.root());

    let mut dependencies = Vec::new();
    for gated in &formula.dependencies {
        let dep = &gated.item;
        dependencies.push(DependencyInfo {
            name: dep.name.clone(),
            phases: dep.phases.clone(),
            applies: gated.applies_to(platform),
            installed: cellar.lookup(&dep.name)?.map(|k| k.version),
        });
    }

    let meta = &formula.formula;
    Ok(FormulaInfo {
        name: meta.name.clone(),
        pkg_version: formula.pkg_version(),
        desc: meta.desc.clone(),
        homepage: meta.homepage.clone(),
        license: meta.license.clone(),
        keg_only: meta.keg_only.clone(),
        deprecated: meta
            .deprecated
            .as_ref()
            .map(|d| format!("{} ({})", d.because, d.date)),
        path: formula.path.clone(),
        dependencies,
        resources: formula
            .resources
            .iter()
            .map(|r| (r.name.clone(), r.component_version()))
            .collect(),
        installed: cellar
            .installed_versions(&meta.name)?
            .into_iter()
            .map(|k| k.version)
            .collect(),
    })
}

pub fn format_info(info: &FormulaInfo) -> String {
    let mut out = format!("{} {}\n", info.name, info.pkg_version);
    if let Some(ref desc) = info.desc {
        out.push_str(&format!("{}\n", desc));
    }
    if let Some(ref homepage) = info.homepage {
        out.push_str(&format!("{}\n", homepage));
    }
    if let Some(ref license) = info.license {
        out.push_str(&format!("License: {}\n", license));
    }
    if let Some(ref reason) = info.keg_only {
        out.push_str(&format!("Keg-only: {}\n", reason));
    }
    if let Some(ref deprecated) = info.deprecated {
        out.push_str(&format!("Deprecated: {}\n", deprecated));
    }
    out.push_str(&format!("From: {}\n", info.path.display()));

    if info.installed.is_empty() {
        out.push_str("Not installed\n");
    } else {
        out.push_str(&format!("Installed: {}\n", info.installed.join(", ")));
    }

    if !info.dependencies.is_empty() {
        out.push_str("Dependencies:\n");
        for dep in &info.dependencies {
            let phases: Vec<String> = dep.phases.iter().map(|p| p.to_string()).collect();
            let state = match (&dep.installed, dep.applies) {
                (_, false) => "not needed on this platform".to_string(),
                (Some(v), true) => format!("installed {}", v),
                (None, true) => "missing".to_string(),
            };
            out.push_str(&format!("  {} [{}] {}\n", dep.name, phases.join(", "), state));
        }
    }

    if !info.resources.is_empty() {
        out.push_str("Resources:\n");
        for (name, version) in &info.resources {
            match version {
                Some(v) => out.push_str(&format!("  {} {}\n", name, v)),
                None => out.push_str(&format!("  {}\n", name)),
            }
        }
    }
    out
}
