//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stagehand::ops::Component;

/// Stagehand - a multi-stage Clang/LLVM toolchain build orchestrator
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build and package the toolchain
    Build(BuildArgs),

    /// List the builders and whether this run would build them
    List(ListArgs),
}

/// Options shared by every command.
#[derive(Args)]
pub struct CommonArgs {
    /// Configuration file (defaults to ./stagehand.toml)
    #[arg(long, env = "STAGEHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Release name of the toolchain
    #[arg(long, default_value = "dev")]
    pub build_name: String,

    /// Leave out parts of the build
    #[arg(long, value_delimiter = ',', value_name = "linux,windows,lldb")]
    pub no_build: Vec<Component>,

    /// Build the next upstream revision
    #[arg(long)]
    pub build_llvm_next: bool,
}

/// Which builders run. The three selections are mutually exclusive.
#[derive(Args)]
pub struct FilterArgs {
    /// Build only these builders
    #[arg(long, num_args = 1.., value_name = "NAMES", conflicts_with_all = ["skip", "skip_build"])]
    pub build: Vec<String>,

    /// Build everything except these builders
    #[arg(long, num_args = 1.., value_name = "NAMES", conflicts_with = "skip_build")]
    pub skip: Vec<String>,

    /// Run no builders; package what is already installed
    #[arg(long)]
    pub skip_build: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Build with LLVM assertions enabled
    #[arg(long)]
    pub enable_assertions: bool,

    /// Disable ThinLTO for stage2
    #[arg(long)]
    pub no_lto: bool,

    /// Build a debug stage2 (no LTO, no stripping)
    #[arg(long)]
    pub debug: bool,

    /// Build an instrumented stage2 for PGO profile collection
    #[arg(long)]
    pub build_instrumented: bool,

    /// Build, but do not package
    #[arg(long, conflicts_with = "skip_build")]
    pub skip_package: bool,

    /// Do not strip packaged binaries
    #[arg(long)]
    pub no_strip: bool,

    /// Do not build device runtimes
    #[arg(long)]
    pub skip_runtimes: bool,

    /// Fail if there is no PGO profile for the revision
    #[arg(long)]
    pub check_pgo_profile: bool,

    /// Use the source tree as it is
    #[arg(long)]
    pub skip_source_setup: bool,

    /// Set up sources without applying the local patches
    #[arg(long)]
    pub no_patch: bool,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}
