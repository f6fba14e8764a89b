//! `stagehand build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use stagehand::ops::run_pipeline;

pub fn execute(args: BuildArgs) -> Result<()> {
    let config = super::load(&args.common)?;
    let mut ctx = super::context(&config);
    if args.jobs.is_some() {
        ctx = ctx.with_jobs(args.jobs);
    }

    let mut opts = super::pipeline_options(&config, &args.common, &args.filter);
    opts.enable_assertions = args.enable_assertions;
    opts.lto = !args.no_lto;
    opts.debug = args.debug;
    opts.build_instrumented = args.build_instrumented;
    opts.skip_package = args.skip_package;
    opts.strip = !args.no_strip;
    opts.skip_runtimes = args.skip_runtimes;
    opts.check_pgo_profile = args.check_pgo_profile;
    opts.skip_source_setup = args.skip_source_setup;
    opts.patch_sources = opts.patch_sources && !args.no_patch;

    let report = run_pipeline(&mut ctx, &opts)?;

    if let Some(update) = report.sources {
        tracing::debug!("sources: {:?}", update);
    }
    for package in &report.packages {
        let location = package.archive.as_ref().unwrap_or(&package.install_dir);
        eprintln!(
            "    Packaged clang {} -> {}",
            package.version,
            location.display()
        );
    }
    eprint!("{}", ctx.timer.report());

    Ok(())
}
