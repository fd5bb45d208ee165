//! Build pipeline stages.
//!
//! A [`BuildPlan`] is evaluated once per platform; the remaining stages
//! execute it inside a [`BuildContext`]:
//! - `patch`: source edits
//! - `executor`: the ordered build commands
//! - `install` / `bootstrap`: laying out the keg
//! - `verify`: smoke tests

pub mod bootstrap;
pub mod context;
pub mod executor;
pub mod install;
pub mod patch;
pub mod plan;
pub mod verify;

pub use context::{BuildContext, DirStack, EnvOverlay, Layout};
pub use executor::BuildExecutor;
pub use install::Installer;
pub use patch::PatchApplier;
pub use plan::{BuildPlan, PlanTarget, PlannedStep};
pub use verify::Verifier;
