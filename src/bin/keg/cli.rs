//! CLI definitions using clap.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use keg::util::GlobalContext;

/// Keg - build and install packages from formula files
#[derive(Parser)]
#[command(name = "keg")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Shared prefix holding the Cellar
    #[arg(long, global = true, env = "KEG_ROOT")]
    pub root: Option<PathBuf>,

    /// Download cache directory
    #[arg(long, global = true, env = "KEG_CACHE")]
    pub cache: Option<PathBuf>,

    /// Extra directory to search for formulae
    #[arg(long = "formula-dir", global = true)]
    pub formula_dirs: Vec<PathBuf>,
}

impl GlobalArgs {
    /// Build the global context, applying command-line overrides.
    pub fn context(&self) -> Result<GlobalContext> {
        let mut ctx = GlobalContext::new()?;
        if let Some(ref root) = self.root {
            ctx.set_root(root.clone());
        }
        if let Some(ref cache) = self.cache {
            ctx.set_cache(cache.clone());
        }
        for dir in &self.formula_dirs {
            ctx.add_formula_dir(dir.clone());
        }
        ctx.set_verbose(self.verbose);
        Ok(ctx)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build and install formulae
    Install(InstallArgs),

    /// Run a formula's test against its installed keg
    Test(TestArgs),

    /// Show the build plan for this platform
    Plan(PlanArgs),

    /// Show formula details and install state
    Info(InfoArgs),

    /// Report installed kegs and bundled clients that are out of date
    Outdated(OutdatedArgs),

    /// Download and verify sources without building
    Fetch(FetchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct InstallArgs {
    /// Formula names or paths
    #[arg(required = true)]
    pub formulae: Vec<String>,

    /// Build from the development branch
    #[arg(long)]
    pub head: bool,

    /// Build a relocatable artifact for distribution
    #[arg(long)]
    pub bottle: bool,

    /// Keep the keg and build tree when something fails
    #[arg(long)]
    pub keep_failed: bool,

    /// Reinstall even if already installed
    #[arg(short, long)]
    pub force: bool,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the formula's test steps
    #[arg(long)]
    pub skip_test: bool,
}

#[derive(Args)]
pub struct TestArgs {
    /// Formula name or path
    pub formula: String,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Formula name or path
    pub formula: String,

    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Plan a development-branch build
    #[arg(long)]
    pub head: bool,

    /// Plan a distributable build
    #[arg(long)]
    pub bottle: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Formula name or path
    pub formula: String,
}

#[derive(Args)]
pub struct OutdatedArgs {
    /// Formula names or paths
    #[arg(required = true)]
    pub formulae: Vec<String>,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Formula names or paths
    #[arg(required = true)]
    pub formulae: Vec<String>,

    /// Fetch the development-branch source
    #[arg(long)]
    pub head: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
