//! High-level operations.
//!
//! This module contains the implementation of Keg commands.

pub mod fetch;
pub mod info;
pub mod keg_install;
pub mod outdated;
pub mod plan;

pub use fetch::{fetch, Fetched};
pub use info::{format_info, info, FormulaInfo};
pub use keg_install::{install, install_formula, InstallOptions, InstallResult};
pub use keg_test::{test, test_formula, TestOptions};
pub use outdated::{outdated, OutdatedEntry, OutdatedReason};
pub use plan::{format_plan, load_formula, plan, plan_formula, PlanOptions};
