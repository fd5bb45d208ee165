//! `keg info` command

use anyhow::Result;

use crate::cli::{GlobalArgs, InfoArgs};
use keg::ops::info::{format_info, info};

pub fn execute(args: InfoArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    let info = info(&ctx, &args.formula)?;
    print!("{}", format_info(&info));
    Ok(())
}
