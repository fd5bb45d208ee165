//! Dependency resolution.
//!
//! Maps a plan's declared dependencies to installed kegs. Resolution is a
//! pure read against the registry: nothing is built or installed here, and
//! dependencies gated off by the platform were already dropped by the plan.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::builder::plan::BuildPlan;
use crate::core::dependency::Phase;
use crate::core::registry::{Keg, PackageRegistry};
use crate::error::PipelineError;

/// Installed kegs for the dependencies of one build.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDeps {
    kegs: BTreeMap<String, Keg>,
}

impl ResolvedDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keg: Keg) {
        self.kegs.insert(keg.name.clone(), keg);
    }

    pub fn get(&self, name: &str) -> Option<&Keg> {
        self.kegs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keg> {
        self.kegs.values()
    }

    pub fn len(&self) -> usize {
        self.kegs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kegs.is_empty()
    }

    /// `name -> version` map for receipts.
    pub fn versions(&self) -> BTreeMap<String, String> {
        self.kegs
            .values()
            .map(|k| (k.name.clone(), k.version.clone()))
            .collect()
    }
}

/// Resolves dependencies against a registry.
pub struct DependencyResolver<'a> {
    registry: &'a dyn PackageRegistry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a dyn PackageRegistry) -> Self {
        DependencyResolver { registry }
    }

    /// Resolve every dependency of `plan` needed in `phases`.
    ///
    /// All missing dependencies are reported together.
    pub fn resolve(&self, plan: &BuildPlan, phases: &[Phase]) -> Result<ResolvedDeps> {
        let mut resolved = ResolvedDeps::new();
        let mut missing = Vec::new();

        for dep in plan.dependencies_for(phases) {
            match self.registry.lookup(&dep.name)? {
                Some(keg) => {
                    tracing::debug!("resolved {} -> {}", dep.name, keg.prefix.display());
                    resolved.insert(keg);
                }
                None => missing.push(dep.name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::Resolution {
                formula: plan.formula.clone(),
                missing,
            }
            .into());
        }
        Ok(resolved)
    }
}
