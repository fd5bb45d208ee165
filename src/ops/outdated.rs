//! Implementation of `keg outdated`.
//!
//! Besides comparing the installed keg with the formula, this looks inside
//! clients installed by a bootstrap action. Their metadata file must not
//! name a version older than the one the formula bundles, nor point back
//! at the throwaway staging copy; either problem shows up as an entry here.

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::builder::{BuildContext, BuildPlan, Layout};
use crate::core::action::InstallAction;
use crate::core::formula::Formula;
use crate::core::platform::{BuildMode, Platform};
use crate::core::registry::{compare_keg_versions, Cellar, PackageRegistry};
use crate::ops::plan::{host_platform, load_formula};
use crate::resolver::ResolvedDeps;
use crate::util::fs::read_to_string;
use crate::util::GlobalContext;

/// Why something is reported as outdated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutdatedReason {
    /// The installed keg is older than the formula
    Formula { installed: String, current: String },
    /// A bundled client does not have the version the formula ships
    Version { installed: String, current: String },
    /// A bundled client's metadata references a local path
    StaleMetadata { resolved: String },
    /// A bundled client's metadata file is gone
    MissingMetadata { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedEntry {
    pub package: String,
    pub reason: OutdatedReason,
}

impl fmt::Display for OutdatedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            OutdatedReason::Formula { installed, current }
            | OutdatedReason::Version { installed, current } => {
                write!(f, "{} ({}) < {}", self.package, installed, current)
            }
            OutdatedReason::StaleMetadata { resolved } => {
                write!(f, "{} (metadata references {})", self.package, resolved)
            }
            OutdatedReason::MissingMetadata { path } => {
                write!(f, "{} (missing {})", self.package, path.display())
            }
        }
    }
}

/// The fields of a package metadata file we look at.
#[derive(Debug, Deserialize)]
struct PackageMetadata {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "_resolved")]
    resolved: Option<String>,
}

pub fn outdated(gctx: &GlobalContext, name_or_path: &str) -> Result<Vec<OutdatedEntry>> {
    let formula = load_formula(gctx, name_or_path)?;
    let platform = host_platform(gctx, BuildMode::default());
    outdated_formula(gctx, &formula, &platform)
}

pub fn outdated_formula(
    gctx: &GlobalContext,
    formula: &Formula,
    platform: &Platform,
) -> Result<Vec<OutdatedEntry>> {
    let plan = BuildPlan::evaluate_installed(formula, platform)?;
    let cellar = Cellar::new(gctx.root());
    let Some(keg) = cellar.lookup(&plan.formula)? else {
        bail!("{} is not installed", plan.formula);
    };

    let mut entries = Vec::new();
    if compare_keg_versions(&keg.version, &plan.pkg_version).is_lt() {
        entries.push(OutdatedEntry {
            package: plan.formula.clone(),
            reason: OutdatedReason::Formula {
                installed: keg.version.clone(),
                current: plan.pkg_version.clone(),
            },
        });
    }

    // bootstrap paths are templates over the installed keg
    let mut layout = Layout::new(&plan, &keg, gctx.root(), gctx.cache_dir(), &keg.prefix);
    layout.version = keg.version.clone();
    let ctx = BuildContext::new(layout, ResolvedDeps::new());

    for action in plan.install.iter().chain(&plan.post_install) {
        let InstallAction::Bootstrap(spec) = action else {
            continue;
        };
        let metadata_path = ctx.expand_path(&spec.package_dir)?.join(&spec.metadata_file);
        if !metadata_path.is_file() {
            entries.push(OutdatedEntry {
                package: spec.resource.clone(),
                reason: OutdatedReason::MissingMetadata {
                    path: metadata_path,
                },
            });
            continue;
        }

        let metadata: PackageMetadata = serde_json::from_str(&read_to_string(&metadata_path)?)
            .with_context(|| format!("failed to parse {}", metadata_path.display()))?;
        let package = metadata.name.unwrap_or_else(|| spec.resource.clone());

        if let Some(resolved) = metadata.resolved {
            if !is_remote(&resolved) {
                entries.push(OutdatedEntry {
                    package: package.clone(),
                    reason: OutdatedReason::StaleMetadata { resolved },
                });
            }
        }

        let current = plan
            .resources
            .iter()
            .find(|r| r.name == spec.resource)
            .and_then(|r| r.component_version());
        if let (Some(installed), Some(current)) = (metadata.version, current) {
            if is_older(&installed, &current) {
                entries.push(OutdatedEntry {
                    package,
                    reason: OutdatedReason::Version { installed, current },
                });
            }
        }
    }
    Ok(entries)
}

/// Semver ordering for client versions, keg ordering for anything else.
fn is_older(installed: &str, current: &str) -> bool {
    match (semver::Version::parse(installed), semver::Version::parse(current)) {
        (Ok(installed), Ok(current)) => installed < current,
        _ => compare_keg_versions(installed, current).is_lt(),
    }
}

fn is_remote(resolved: &str) -> bool {
    resolved.starts_with("https://") || resolved.starts_with("http://")
}
