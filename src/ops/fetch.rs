//! Implementation of `keg fetch`: download and verify a formula's
//! source and resources without building anything.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::BuildPlan;
use crate::core::platform::BuildMode;
use crate::ops::plan::plan_formula;
use crate::sources::ResourceFetcher;
use crate::util::GlobalContext;

/// A verified download in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub name: String,
    pub path: PathBuf,
}

/// Fetch everything `name_or_path` needs on this platform.
pub fn fetch(gctx: &GlobalContext, name_or_path: &str, mode: BuildMode) -> Result<Vec<Fetched>> {
    let (_, plan) = plan_formula(gctx, name_or_path, mode)?;
    fetch_plan(gctx, &plan)
}

pub fn fetch_plan(gctx: &GlobalContext, plan: &BuildPlan) -> Result<Vec<Fetched>> {
    let mut fetcher = ResourceFetcher::new(gctx.cache_dir());
    let mut fetched = Vec::new();

    if let Some(ref source) = plan.source {
        match fetcher.prefetch_source(&plan.formula, source)? {
            Some(path) => fetched.push(Fetched {
                name: plan.formula.clone(),
                path,
            }),
            None => tracing::info!("{} is a git source, cloned at build time", source.url()),
        }
    }

    for resource in &plan.resources {
        let path = fetcher.fetch_resource(resource)?;
        fetched.push(Fetched {
            name: resource.name.clone(),
            path,
        });
    }
    Ok(fetched)
}
