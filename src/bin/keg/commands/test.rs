//! `keg test` command

use anyhow::Result;

use crate::cli::{GlobalArgs, TestArgs};
use keg::ops::keg_test::{test, TestOptions};

pub fn execute(args: TestArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    test(
        &ctx,
        &args.formula,
        &TestOptions {
            verbose: global.verbose,
        },
    )
}
