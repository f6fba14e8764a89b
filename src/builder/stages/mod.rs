//! The concrete builders of the toolchain pipeline.
//!
//! Each function here constructs one builder from [`StageOptions`]; the
//! pipeline driver registers them and decides which run. Order in
//! [`all_builders`] is the order the pipeline runs them in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::{BuildError, Builder};
use crate::core::host::Host;
use crate::core::paths::Paths;
use crate::util::fs::ensure_dir;

pub mod host_tools;
pub mod runtimes;
pub mod stage1;
pub mod stage2;
pub mod sysroots;
pub mod windows;

pub const STAGE1: &str = "stage1";
pub const STAGE2: &str = "stage2";
pub const SWIG: &str = "swig";
pub const LIBEDIT: &str = "libedit";
pub const SYSROOTS: &str = "sysroots";
pub const BUILTINS: &str = "builtins";
pub const LIBUNWIND: &str = "libunwind";
pub const PLATFORM_LIBCXXABI: &str = "platform-libcxxabi";
pub const COMPILER_RT: &str = "compiler-rt";
pub const COMPILER_RT_I386_HOST: &str = "compiler-rt-i386-host";
pub const LIBOMP: &str = "libomp";
pub const LLDB_SERVER: &str = "lldb-server";
pub const LIBCXXABI: &str = "libcxxabi";
pub const LIBCXX: &str = "libcxx";
pub const WINDOWS: &str = "windows-x86-64";

/// Knobs shared by the stage builders.
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Release name, also part of the vendor string
    pub build_name: String,
    /// Upstream revision, e.g. `r383902`
    pub revision: String,
    /// Overrides the vendor string derived from the build name
    pub clang_vendor: Option<String>,
    pub patch_level: Option<String>,
    pub enable_assertions: bool,
    pub lto: bool,
    pub debug: bool,
    pub instrumented: bool,
    /// PGO profile for stage2
    pub profdata: Option<PathBuf>,
    /// No profile was found for a build that wanted one; stage2's vendor
    /// string says so
    pub missing_profile: bool,
    pub build_lldb: bool,
    /// Build stage1 with the tools later stages need (tablegens, llvm-config)
    pub build_llvm_tools: bool,
    /// Build stage1 for every target instead of the host only
    pub build_all_targets: bool,
}

impl Default for StageOptions {
    fn default() -> Self {
        StageOptions {
            build_name: "dev".to_string(),
            revision: crate::util::config::DEFAULT_REVISION.to_string(),
            clang_vendor: None,
            patch_level: None,
            enable_assertions: false,
            lto: true,
            debug: false,
            instrumented: false,
            profdata: None,
            missing_profile: false,
            build_lldb: true,
            build_llvm_tools: false,
            build_all_targets: false,
        }
    }
}

impl StageOptions {
    /// The `CLANG_VENDOR` string stamped into `clang --version`.
    pub fn vendor(&self) -> String {
        self.clang_vendor
            .clone()
            .unwrap_or_else(|| format!("Android ({} based on {})", self.build_name, self.revision))
    }

    /// The vendor string of stage2, noting a missing PGO profile.
    pub fn stage2_vendor(&self) -> String {
        if self.clang_vendor.is_some() || !self.missing_profile {
            return self.vendor();
        }
        format!(
            "Android ({}, NO PGO PROFILE,  based on {})",
            self.build_name, self.revision
        )
    }
}

/// Every builder of the pipeline, in execution order.
pub fn all_builders(paths: &Paths, host: Host, opts: &StageOptions) -> Result<Vec<Arc<dyn Builder>>> {
    let mut builders: Vec<Arc<dyn Builder>> = vec![
        Arc::new(stage1::stage1(paths, host, opts)),
        Arc::new(host_tools::swig(paths, host)),
        Arc::new(host_tools::libedit(paths, host)),
        Arc::new(stage2::stage2(paths, host, opts)),
        Arc::new(sysroots::SysrootsBuilder::new(paths)?),
        Arc::new(runtimes::builtins(paths)?),
        Arc::new(runtimes::libunwind(paths)?),
        Arc::new(runtimes::platform_libcxxabi(paths)?),
        Arc::new(runtimes::compiler_rt(paths)?),
    ];
    if host.is_linux() {
        builders.push(Arc::new(runtimes::compiler_rt_i386_host(paths)?));
    }
    builders.push(Arc::new(runtimes::libomp(paths)?));
    builders.push(Arc::new(runtimes::lldb_server(paths)?));
    builders.push(Arc::new(windows::libcxxabi(paths, opts)));
    builders.push(Arc::new(windows::libcxx(paths, opts)));
    builders.push(Arc::new(windows::windows_toolchain(paths, opts)));
    Ok(builders)
}

/// Copy a build artifact to `dst`, creating parent directories. A missing
/// source is a [`BuildError::MissingArtifact`].
pub fn install_artifact(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        return Err(BuildError::MissingArtifact {
            path: src.to_path_buf(),
        }
        .into());
    }
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    std::fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Copy `src` into directory `dir`, keeping its file name.
pub fn install_into(src: &Path, dir: &Path) -> Result<()> {
    let name = src
        .file_name()
        .with_context(|| format!("{} has no file name", src.display()))?;
    install_artifact(src, &dir.join(name))
}
