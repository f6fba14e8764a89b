//! `stagehand list` command

use anyhow::Result;

use crate::cli::ListArgs;
use stagehand::ops::{apply_filters, register_builders};

pub fn execute(args: ListArgs) -> Result<()> {
    let config = super::load(&args.common)?;
    let mut ctx = super::context(&config);
    let opts = super::pipeline_options(&config, &args.common, &args.filter);

    let plan = opts.plan(ctx.host);
    register_builders(&mut ctx, &opts.stage_options(&plan, None))?;
    apply_filters(&mut ctx, &opts)?;

    for name in ctx.builders.names() {
        let builder = ctx.builders.get(name)?;
        let mark = if ctx.builders.should_build(name) {
            "build"
        } else {
            "skip"
        };
        println!("{:<24} {}", name, mark);
        for entry in builder.config_list() {
            println!("    {}", entry);
        }
    }
    Ok(())
}
