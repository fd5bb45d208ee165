//! Keg - a formula-driven package builder
//!
//! This crate provides the core library functionality for Keg: formula
//! parsing, per-platform build planning, dependency resolution against the
//! Cellar, verified downloads, and the patch, build, install and verify
//! stages.

pub mod builder;
pub mod core;
pub mod error;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test utilities for Keg unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a sandboxed prefix and formula fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::BuildPlan;
pub use core::formula::Formula;
pub use error::PipelineError;
pub use util::context::GlobalContext;
