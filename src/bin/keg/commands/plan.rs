//! `keg plan` command

use anyhow::Result;

use crate::cli::{GlobalArgs, PlanArgs};
use keg::core::BuildMode;
use keg::ops::plan::{plan, PlanOptions};

pub fn execute(args: PlanArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    let opts = PlanOptions {
        mode: BuildMode {
            bottle: args.bottle,
            head: args.head,
        },
        json: args.json,
    };

    let output = plan(&ctx, &args.formula, &opts)?;
    if output.ends_with('\n') {
        print!("{}", output);
    } else {
        println!("{}", output);
    }
    Ok(())
}
