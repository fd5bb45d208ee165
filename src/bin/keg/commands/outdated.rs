//! `keg outdated` command

use anyhow::Result;

use crate::cli::{GlobalArgs, OutdatedArgs};
use keg::ops::outdated::outdated;

pub fn execute(args: OutdatedArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;

    for formula in &args.formulae {
        for entry in outdated(&ctx, formula)? {
            println!("{}", entry);
        }
    }
    Ok(())
}
