//! `keg install` command

use anyhow::Result;

use crate::cli::{GlobalArgs, InstallArgs};
use keg::ops::keg_install::{install, InstallOptions};

pub fn execute(args: InstallArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;

    let opts = InstallOptions {
        head: args.head,
        bottle: args.bottle,
        keep_failed: args.keep_failed,
        force: args.force,
        jobs: args.jobs,
        verbose: global.verbose,
        skip_test: args.skip_test,
    };

    for formula in &args.formulae {
        let result = install(&ctx, formula, &opts)?;
        println!("{}", result.keg.prefix.display());
    }
    Ok(())
}
