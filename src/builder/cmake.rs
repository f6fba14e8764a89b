//! CMake builder: configure, compile and install one entry at a time.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::builder::context::BuildContext;
use crate::builder::layers::{compose, BaseCMakeLayer, ConfigLayer, EntryConfig, EntryContext};
use crate::builder::registry::BuildState;
use crate::builder::toolchain::ToolchainHandle;
use crate::builder::Builder;
use crate::core::matrix::ConfigEntry;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists};
use crate::util::process::ProcessBuilder;

/// Which compiler a builder uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainSource {
    /// Whatever is registered as the runtime toolchain when the builder runs
    Runtime,
    /// The install of another builder
    Builder(String),
}

/// Runs for one entry, with the entry's context.
pub type EntryHook = Box<dyn Fn(&EntryContext<'_>) -> Result<()> + Send + Sync>;

/// Runs once per builder, after all entries installed.
pub type FinishHook = Box<dyn Fn(&BuildContext, &ToolchainHandle) -> Result<()> + Send + Sync>;

/// Computes an install directory per entry.
pub type InstallDirFn =
    Box<dyn Fn(&BuildContext, &ConfigEntry, &ToolchainHandle) -> Result<PathBuf> + Send + Sync>;

/// Wrap a closure as an [`EntryHook`].
pub fn entry_hook<F>(f: F) -> EntryHook
where
    F: Fn(&EntryContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Wrap a closure as a [`FinishHook`].
pub fn finish_hook<F>(f: F) -> FinishHook
where
    F: Fn(&BuildContext, &ToolchainHandle) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Where a builder installs.
pub enum InstallLocation {
    /// A fixed directory
    Fixed(PathBuf),
    /// The compiler resource root of the builder's toolchain
    ClangLibDir,
    /// Computed per entry
    PerEntry(InstallDirFn),
}

impl InstallLocation {
    pub fn per_entry<F>(f: F) -> Self
    where
        F: Fn(&BuildContext, &ConfigEntry, &ToolchainHandle) -> Result<PathBuf>
            + Send
            + Sync
            + 'static,
    {
        InstallLocation::PerEntry(Box::new(f))
    }
}

impl fmt::Debug for InstallLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallLocation::Fixed(p) => f.debug_tuple("Fixed").field(p).finish(),
            InstallLocation::ClangLibDir => f.write_str("ClangLibDir"),
            InstallLocation::PerEntry(_) => f.write_str("PerEntry(..)"),
        }
    }
}

/// A builder that drives `cmake -G Ninja`, `ninja [target]` and
/// `ninja install` for each configuration entry.
pub struct CMakeBuilder {
    name: String,
    src_dir: PathBuf,
    config_list: Vec<ConfigEntry>,
    toolchain: ToolchainSource,
    install_location: InstallLocation,
    layers: Vec<Box<dyn ConfigLayer>>,
    ninja_target: Option<String>,
    install: bool,
    remove_cmake_cache: bool,
    remove_install_dir: bool,
    output_tag: Option<fn(&ConfigEntry) -> &'static str>,
    before_entry: Vec<EntryHook>,
    after_install: Vec<EntryHook>,
    on_finish: Vec<FinishHook>,
}

impl CMakeBuilder {
    /// A builder with only the base layer, installing into the resource
    /// root of the runtime toolchain.
    pub fn new(
        name: impl Into<String>,
        src_dir: impl Into<PathBuf>,
        config_list: Vec<ConfigEntry>,
    ) -> Self {
        CMakeBuilder {
            name: name.into(),
            src_dir: src_dir.into(),
            config_list,
            toolchain: ToolchainSource::Runtime,
            install_location: InstallLocation::ClangLibDir,
            layers: vec![Box::new(BaseCMakeLayer)],
            ninja_target: None,
            install: true,
            remove_cmake_cache: false,
            remove_install_dir: false,
            output_tag: None,
            before_entry: Vec::new(),
            after_install: Vec::new(),
            on_finish: Vec::new(),
        }
    }

    pub fn toolchain(mut self, source: ToolchainSource) -> Self {
        self.toolchain = source;
        self
    }

    pub fn install_to(mut self, location: InstallLocation) -> Self {
        self.install_location = location;
        self
    }

    /// Append a configuration layer; it runs after every layer added before it.
    pub fn layer(mut self, layer: impl ConfigLayer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn boxed_layer(mut self, layer: Box<dyn ConfigLayer>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Build only this target instead of the default.
    pub fn ninja_target(mut self, target: impl Into<String>) -> Self {
        self.ninja_target = Some(target.into());
        self
    }

    /// Skip `ninja install`; post-install hooks still run.
    pub fn no_install(mut self) -> Self {
        self.install = false;
        self
    }

    /// Delete CMake caches before configuring.
    pub fn remove_cmake_cache(mut self) -> Self {
        self.remove_cmake_cache = true;
        self
    }

    /// Delete the install directory before the first entry.
    pub fn remove_install_dir(mut self) -> Self {
        self.remove_install_dir = true;
        self
    }

    /// Append an extra tag to the output directory name for each entry.
    pub fn output_tag(mut self, tag: fn(&ConfigEntry) -> &'static str) -> Self {
        self.output_tag = Some(tag);
        self
    }

    pub fn before_entry(mut self, hook: EntryHook) -> Self {
        self.before_entry.push(hook);
        self
    }

    pub fn after_install(mut self, hook: EntryHook) -> Self {
        self.after_install.push(hook);
        self
    }

    pub fn on_finish(mut self, hook: FinishHook) -> Self {
        self.on_finish.push(hook);
        self
    }

    fn install_dir_with(
        &self,
        ctx: &BuildContext,
        entry: &ConfigEntry,
        toolchain: &ToolchainHandle,
    ) -> Result<PathBuf> {
        match &self.install_location {
            InstallLocation::Fixed(dir) => Ok(dir.clone()),
            InstallLocation::ClangLibDir => Ok(toolchain.clang_lib_dir()?),
            InstallLocation::PerEntry(f) => f(ctx, entry, toolchain),
        }
    }

    /// The merged configuration for `entry`, without running anything.
    pub fn entry_config(&self, ctx: &BuildContext, entry: &ConfigEntry) -> Result<EntryConfig> {
        let toolchain = ctx.toolchain_for(&self.toolchain)?;
        let output_dir = self.output_dir(ctx, entry);
        let install_dir = self.install_dir_with(ctx, entry, &toolchain)?;
        let cx = EntryContext {
            ctx,
            builder: &self.name,
            entry,
            toolchain: &toolchain,
            src_dir: &self.src_dir,
            output_dir: &output_dir,
            install_dir: &install_dir,
        };
        compose(&self.layers, &cx)
    }

    fn command(&self, ctx: &BuildContext, program: &Path, cfg: &EntryConfig, cwd: &Path) -> ProcessBuilder {
        ProcessBuilder::new(program)
            .cwd(cwd)
            .env_clear()
            .envs(&ctx.base_env)
            .envs(&cfg.env)
    }
}

impl Builder for CMakeBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_list(&self) -> &[ConfigEntry] {
        &self.config_list
    }

    fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    fn install_dir(&self, ctx: &BuildContext, entry: &ConfigEntry) -> Result<PathBuf> {
        let toolchain = ctx.toolchain_for(&self.toolchain)?;
        self.install_dir_with(ctx, entry, &toolchain)
    }

    fn output_dir(&self, ctx: &BuildContext, entry: &ConfigEntry) -> PathBuf {
        let tag = self.output_tag.map(|f| f(entry)).unwrap_or_default();
        ctx.paths
            .out_path(format!("{}{}{}", self.name, entry.output_suffix(), tag))
    }

    fn prepare(&self, ctx: &mut BuildContext) -> Result<()> {
        if !self.remove_install_dir {
            return Ok(());
        }
        let mut dirs = BTreeSet::new();
        for entry in &self.config_list {
            dirs.insert(self.install_dir(ctx, entry)?);
        }
        for dir in dirs {
            tracing::debug!("removing install dir {}", dir.display());
            remove_dir_all_if_exists(&dir)?;
        }
        Ok(())
    }

    fn build_entry(&self, ctx: &mut BuildContext, entry: &ConfigEntry) -> Result<()> {
        let toolchain = ctx.toolchain_for(&self.toolchain)?;
        let output_dir = self.output_dir(ctx, entry);
        let install_dir = self.install_dir_with(ctx, entry, &toolchain)?;

        let cfg = {
            let cx = EntryContext {
                ctx,
                builder: &self.name,
                entry,
                toolchain: &toolchain,
                src_dir: &self.src_dir,
                output_dir: &output_dir,
                install_dir: &install_dir,
            };
            for hook in &self.before_entry {
                hook(&cx)?;
            }
            compose(&self.layers, &cx)?
        };

        if self.remove_cmake_cache {
            remove_cmake_cache(&output_dir)?;
        }
        ensure_dir(&output_dir)?;

        ctx.builders.transition(&self.name, BuildState::Configuring)?;
        tracing::info!("Configuring {} in {}", self.name, output_dir.display());
        let configure = self
            .command(ctx, &ctx.paths.cmake, &cfg, &output_dir)
            .args(["-G", "Ninja"])
            .args(cfg.cmake_args())
            .arg(&self.src_dir);
        ctx.runner
            .run(&configure)
            .with_context(|| format!("configure step failed for {}", self.name))?;

        ctx.builders.transition(&self.name, BuildState::Compiling)?;
        tracing::info!("Compiling {}", self.name);
        let mut compile = self.command(ctx, &ctx.paths.ninja, &cfg, &output_dir);
        if let Some(jobs) = ctx.jobs {
            compile = compile.arg(format!("-j{}", jobs));
        }
        if let Some(target) = &self.ninja_target {
            compile = compile.arg(target);
        }
        ctx.runner
            .run(&compile)
            .with_context(|| format!("build step failed for {}", self.name))?;

        if !self.install && self.after_install.is_empty() {
            return Ok(());
        }

        ctx.builders.transition(&self.name, BuildState::Installing)?;
        if self.install {
            tracing::info!("Installing {} to {}", self.name, install_dir.display());
            let install = self
                .command(ctx, &ctx.paths.ninja, &cfg, &output_dir)
                .arg("install");
            ctx.runner
                .run(&install)
                .with_context(|| format!("install step failed for {}", self.name))?;
        }

        let cx = EntryContext {
            ctx,
            builder: &self.name,
            entry,
            toolchain: &toolchain,
            src_dir: &self.src_dir,
            output_dir: &output_dir,
            install_dir: &install_dir,
        };
        for hook in &self.after_install {
            hook(&cx).with_context(|| format!("post-install step failed for {}", self.name))?;
        }
        Ok(())
    }

    fn finish(&self, ctx: &mut BuildContext) -> Result<()> {
        if self.on_finish.is_empty() {
            return Ok(());
        }
        let toolchain = ctx.toolchain_for(&self.toolchain)?;
        for hook in &self.on_finish {
            hook(ctx, &toolchain)?;
        }
        Ok(())
    }
}

/// Remove every `CMakeCache.txt` and `CMakeFiles` under `dir`.
pub fn remove_cmake_cache(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let mut stale = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let name = entry.file_name();
        if name == "CMakeCache.txt" || (name == "CMakeFiles" && entry.file_type().is_dir()) {
            stale.push(entry.into_path());
        }
    }
    for path in stale {
        if path.is_dir() {
            remove_dir_all_if_exists(&path)?;
        } else if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}
