//! `keg fetch` command

use anyhow::Result;

use crate::cli::{FetchArgs, GlobalArgs};
use keg::core::BuildMode;
use keg::ops::fetch::fetch;

pub fn execute(args: FetchArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    let mode = BuildMode {
        bottle: false,
        head: args.head,
    };

    for formula in &args.formulae {
        for fetched in fetch(&ctx, formula, mode)? {
            eprintln!("     Fetched {}", fetched.name);
            println!("{}", fetched.path.display());
        }
    }
    Ok(())
}
