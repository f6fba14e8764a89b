//! Build context - everything a builder needs, passed explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::cmake::ToolchainSource;
use crate::builder::registry::BuilderRegistry;
use crate::builder::runner::CommandRunner;
use crate::builder::toolchain::{ToolchainHandle, ToolchainRegistry};
use crate::core::host::Host;
use crate::core::paths::Paths;
use crate::util::timer::StageTimer;

/// State shared by every builder in a run.
///
/// Created once at startup; the pipeline driver is its only writer.
pub struct BuildContext {
    /// Source and output locations
    pub paths: Paths,

    /// The machine running the build
    pub host: Host,

    /// Runtime and output toolchains
    pub toolchains: ToolchainRegistry,

    /// Every builder in this run
    pub builders: BuilderRegistry,

    /// Executes external commands
    pub runner: Arc<dyn CommandRunner>,

    /// Environment captured at startup; the only inherited variables
    pub base_env: BTreeMap<String, String>,

    /// Parallel jobs for the build executor
    pub jobs: Option<usize>,

    /// Per-builder wall-clock times
    pub timer: StageTimer,
}

impl BuildContext {
    /// Create a context whose runtime toolchain is the bootstrap prebuilt.
    pub fn new(paths: Paths, host: Host, runner: Arc<dyn CommandRunner>) -> Self {
        let bootstrap = Arc::new(ToolchainHandle::prebuilt(&paths.prebuilt_clang));
        BuildContext {
            toolchains: ToolchainRegistry::new(bootstrap),
            builders: BuilderRegistry::new(),
            base_env: std::env::vars().collect(),
            jobs: None,
            timer: StageTimer::new(),
            paths,
            host,
            runner,
        }
    }

    /// Replace the captured base environment.
    pub fn with_base_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// The toolchain a builder compiles with.
    pub fn toolchain_for(&self, source: &ToolchainSource) -> Result<Arc<ToolchainHandle>> {
        match source {
            ToolchainSource::Runtime => Ok(self.toolchains.runtime()),
            ToolchainSource::Builder(name) => Ok(Arc::new(self.toolchain_of(name)?)),
        }
    }

    /// Describe the installation produced by builder `name`.
    ///
    /// Pure: the install is only read when its version is first needed.
    pub fn toolchain_of(&self, name: &str) -> Result<ToolchainHandle> {
        let (install, build) = self.builder_roots(name)?;
        Ok(ToolchainHandle::from_install(install, build))
    }

    /// Like [`toolchain_of`](Self::toolchain_of), but reads the version now.
    /// Used right after the builder reports a successful install.
    pub fn resolve_toolchain_of(&self, name: &str) -> Result<ToolchainHandle> {
        let (install, build) = self.builder_roots(name)?;
        ToolchainHandle::resolve(&install, build)
            .with_context(|| format!("builder `{}` did not produce a usable toolchain", name))
    }

    /// Install directory of a registered builder's first entry.
    pub fn install_dir_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.builder_roots(name)?.0)
    }

    fn builder_roots(&self, name: &str) -> Result<(PathBuf, PathBuf)> {
        let builder = self.builders.get(name)?;
        let entry = builder
            .config_list()
            .first()
            .with_context(|| format!("builder `{}` has no configurations", name))?;
        Ok((
            builder.install_dir(self, entry)?,
            builder.output_dir(self, entry),
        ))
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("paths", &self.paths)
            .field("host", &self.host)
            .field("toolchains", &self.toolchains)
            .field("builders", &self.builders)
            .field("jobs", &self.jobs)
            .finish()
    }
}
