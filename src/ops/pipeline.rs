//! The pipeline driver: which builders run, in what order, and which
//! toolchain each of them compiles with.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::builder::stages::{
    all_builders, StageOptions, BUILTINS, COMPILER_RT, COMPILER_RT_I386_HOST, LIBCXX, LIBCXXABI,
    LIBEDIT, LIBOMP, LIBUNWIND, LLDB_SERVER, PLATFORM_LIBCXXABI, STAGE1, STAGE2, SWIG, SYSROOTS,
    WINDOWS,
};
use crate::builder::win_sdk::WinSdk;
use crate::builder::{BuildContext, BuildOutcome, ToolchainHandle};
use crate::core::host::Host;
use crate::ops::package::{package_toolchain, PackageOptions, PackageResult};
use crate::ops::sources::{setup_sources, SourceOptions, SourceUpdate};

/// Parts of the build that `--no-build` can leave out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Linux,
    Windows,
    Lldb,
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Component::Linux),
            "windows" => Ok(Component::Windows),
            "lldb" => Ok(Component::Lldb),
            other => Err(format!(
                "unknown component `{}` (expected linux, windows or lldb)",
                other
            )),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::Linux => "linux",
            Component::Windows => "windows",
            Component::Lldb => "lldb",
        })
    }
}

/// Options for a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Release name of the toolchain
    pub build_name: String,

    /// Upstream revision being built
    pub revision: String,

    pub clang_vendor: Option<String>,
    pub patch_level: Option<String>,
    pub enable_assertions: bool,
    pub lto: bool,
    pub debug: bool,

    /// Build an instrumented stage2 for profile collection
    pub build_instrumented: bool,

    /// Run no builders, only packaging
    pub skip_build: bool,
    pub skip_package: bool,
    pub skip_source_setup: bool,
    pub patch_sources: bool,
    pub strip: bool,
    pub create_tar: bool,

    /// Build only these builders
    pub build: Vec<String>,

    /// Build everything but these builders
    pub skip: Vec<String>,

    pub skip_runtimes: bool,
    pub no_build: Vec<Component>,

    /// Fail instead of building without a PGO profile
    pub check_pgo_profile: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            build_name: "dev".to_string(),
            revision: crate::util::config::DEFAULT_REVISION.to_string(),
            clang_vendor: None,
            patch_level: None,
            enable_assertions: false,
            lto: true,
            debug: false,
            build_instrumented: false,
            skip_build: false,
            skip_package: false,
            skip_source_setup: false,
            patch_sources: true,
            strip: true,
            create_tar: true,
            build: Vec::new(),
            skip: Vec::new(),
            skip_runtimes: false,
            no_build: Vec::new(),
            check_pgo_profile: false,
        }
    }
}

/// What a run does on a given host, derived from [`PipelineOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePlan {
    /// Build stage2, the shipped host compiler
    pub need_host: bool,
    /// Cross-compile the Windows toolchain
    pub need_windows: bool,
    pub build_lldb: bool,
    pub instrumented: bool,
    pub debug: bool,
    /// Build device runtimes after stage2
    pub runtimes: bool,
}

impl PipelineOptions {
    fn excludes(&self, component: Component) -> bool {
        self.no_build.contains(&component)
    }

    pub fn plan(&self, host: Host) -> PipelinePlan {
        let need_host = host.is_darwin() || !self.excludes(Component::Linux);
        PipelinePlan {
            need_host,
            need_windows: host.is_linux() && !self.excludes(Component::Windows),
            build_lldb: !self.excludes(Component::Lldb),
            instrumented: host.is_linux() && self.build_instrumented,
            debug: self.debug,
            runtimes: need_host && host.is_linux() && !self.skip_runtimes,
        }
    }

    /// Options for the stage builders under `plan`.
    pub fn stage_options(&self, plan: &PipelinePlan, profdata: Option<PathBuf>) -> StageOptions {
        let missing_profile = plan.need_host && profdata.is_none();
        StageOptions {
            build_name: self.build_name.clone(),
            revision: self.revision.clone(),
            clang_vendor: self.clang_vendor.clone(),
            patch_level: self.patch_level.clone(),
            enable_assertions: self.enable_assertions,
            lto: self.lto,
            debug: self.debug,
            instrumented: plan.instrumented,
            profdata: if plan.instrumented { None } else { profdata },
            missing_profile,
            build_lldb: plan.build_lldb,
            build_llvm_tools: plan.instrumented || plan.need_windows || self.debug,
            build_all_targets: self.debug || plan.instrumented,
        }
    }
}

/// What a pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub sources: Option<SourceUpdate>,
    pub packages: Vec<PackageResult>,
}

/// Register every builder of the pipeline with `ctx`.
pub fn register_builders(ctx: &mut BuildContext, stage_opts: &StageOptions) -> Result<()> {
    for builder in all_builders(&ctx.paths, ctx.host, stage_opts)? {
        ctx.builders.register(builder)?;
    }
    Ok(())
}

/// Install the builder filter selected by `opts` and validate it.
pub fn apply_filters(ctx: &mut BuildContext, opts: &PipelineOptions) -> Result<()> {
    if opts.skip_build {
        ctx.builders.add_predicate_filter(|_| false)?;
    }
    if !opts.skip.is_empty() {
        ctx.builders.add_exclude_filter(opts.skip.iter().cloned())?;
    }
    if !opts.build.is_empty() {
        ctx.builders.add_include_filter(opts.build.iter().cloned())?;
    }
    ctx.builders.validate_filter()?;
    Ok(())
}

/// `<profiles>/<revision>.profdata`, if it exists.
fn find_profile(ctx: &BuildContext, revision: &str) -> Option<PathBuf> {
    let profile = ctx
        .paths
        .profiles_dir()
        .join(format!("{}.profdata", revision));
    profile.is_file().then_some(profile)
}

/// Run the registered builder `name`.
fn build(ctx: &mut BuildContext, name: &str) -> Result<BuildOutcome> {
    let builder = ctx.builders.get(name)?;
    builder.build(ctx)
}

/// The toolchain installed by `name`. A skipped builder's earlier install
/// is described without being read.
fn installed_toolchain(
    ctx: &BuildContext,
    name: &str,
    outcome: BuildOutcome,
) -> Result<Arc<ToolchainHandle>> {
    let handle = match outcome {
        BuildOutcome::Built => ctx.resolve_toolchain_of(name)?,
        BuildOutcome::Skipped => ctx.toolchain_of(name)?,
    };
    Ok(Arc::new(handle))
}

/// Run the whole pipeline: sources, stage1, host tools, stage2, device
/// runtimes, the Windows toolchain, then packaging.
pub fn run_pipeline(ctx: &mut BuildContext, opts: &PipelineOptions) -> Result<PipelineReport> {
    let plan = opts.plan(ctx.host);
    tracing::debug!("pipeline plan: {:?}", plan);

    let mut profdata = None;
    if plan.need_host {
        profdata = find_profile(ctx, &opts.revision);
        if profdata.is_none() {
            if opts.check_pgo_profile {
                bail!(
                    "PGO profile {}.profdata not found in {}",
                    opts.revision,
                    ctx.paths.profiles_dir().display()
                );
            }
            tracing::warn!("no PGO profile for {}, building without one", opts.revision);
        }
    }

    let stage_opts = opts.stage_options(&plan, profdata);
    register_builders(ctx, &stage_opts)?;
    apply_filters(ctx, opts)?;

    let mut report = PipelineReport::default();
    if !opts.skip_source_setup {
        let source_opts = SourceOptions {
            patch: opts.patch_sources,
            revision: opts.revision.clone(),
        };
        report.sources = Some(setup_sources(ctx, &source_opts)?);
    }

    let built = build_stages(ctx, &plan);
    let times = ctx.paths.dist_dir.join("build_times.txt");
    ctx.timer.write_report(&times)?;
    let output = built?;

    if opts.skip_package {
        return Ok(report);
    }
    if let Some(output) = output {
        let package = PackageOptions {
            build_name: opts.build_name.clone(),
            host: ctx.host,
            strip: opts.strip && !opts.debug,
            create_tar: opts.create_tar,
            build_lldb: plan.build_lldb,
            revision: opts.revision.clone(),
        };
        report
            .packages
            .push(package_toolchain(ctx, output.path(), &package)?);
    }
    if plan.need_windows {
        let install = ctx.install_dir_of(WINDOWS)?;
        let package = PackageOptions {
            build_name: opts.build_name.clone(),
            host: Host::Windows,
            strip: opts.strip,
            create_tar: opts.create_tar,
            build_lldb: plan.build_lldb,
            revision: opts.revision.clone(),
        };
        report
            .packages
            .push(package_toolchain(ctx, &install, &package).context("Windows packaging failed")?);
    }
    Ok(report)
}

/// Run the builders in order. Returns the output toolchain when the host
/// compiler is part of this run.
fn build_stages(ctx: &mut BuildContext, plan: &PipelinePlan) -> Result<Option<Arc<ToolchainHandle>>> {
    let outcome = build(ctx, STAGE1)?;
    let stage1 = installed_toolchain(ctx, STAGE1, outcome)?;
    ctx.toolchains.set_runtime(stage1);

    if plan.build_lldb {
        build(ctx, SWIG)?;
        if ctx.builders.should_build(STAGE2) {
            build(ctx, LIBEDIT)?;
        }
    }

    let mut output = None;
    if plan.need_host {
        let outcome = build(ctx, STAGE2)?;
        let stage2 = installed_toolchain(ctx, STAGE2, outcome)?;
        ctx.toolchains.set_output(stage2.clone())?;
        if !plan.instrumented && !plan.debug {
            ctx.toolchains.set_runtime(stage2.clone());
        }
        output = Some(stage2);
    }

    if plan.runtimes {
        let mut runtimes = vec![
            SYSROOTS,
            BUILTINS,
            LIBUNWIND,
            PLATFORM_LIBCXXABI,
            COMPILER_RT,
        ];
        if ctx.builders.contains(COMPILER_RT_I386_HOST) {
            runtimes.push(COMPILER_RT_I386_HOST);
        }
        runtimes.push(LIBOMP);
        if plan.build_lldb {
            runtimes.push(LLDB_SERVER);
        }
        for name in runtimes {
            build(ctx, name)?;
        }
    }

    if plan.need_windows {
        let windows_builders = [LIBCXXABI, LIBCXX, WINDOWS];
        let building = windows_builders
            .iter()
            .any(|name| ctx.builders.should_build(name));
        if let Some(sdk) = ctx.paths.win_sdk.clone().filter(|_| building) {
            WinSdk::open(&sdk)?.prepare()?;
        }
        for name in windows_builders {
            build(ctx, name)?;
        }
    }
    Ok(output)
}
