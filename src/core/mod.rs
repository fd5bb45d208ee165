//! Core data structures for Keg.
//!
//! This module contains the formula model and everything it refers to:
//! - Formula files and their sections
//! - Platform detection and `when` / `unless` conditions
//! - Template placeholders
//! - The installed-package registry

pub mod action;
pub mod dependency;
pub mod formula;
pub mod patch;
pub mod platform;
pub mod registry;
pub mod resource;
pub mod step;
pub mod template;

pub use action::{BootstrapSpec, InstallAction};
pub use dependency::{Dependency, Gated, Phase};
pub use formula::{find_formula, Formula};
pub use patch::{Patch, PatchEdit};
pub use platform::{BuildMode, Condition, Platform};
pub use registry::{Cellar, InMemoryRegistry, InstallReceipt, Keg, PackageRegistry};
pub use resource::{Resource, SourceSpec};
pub use step::{EnvAction, EnvOp, Step, TestStep};
