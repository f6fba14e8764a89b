//! Builder for autotools projects: `configure`, `make`, `make install`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::cmake::{EntryHook, ToolchainSource};
use crate::builder::context::BuildContext;
use crate::builder::flags;
use crate::builder::layers::EntryContext;
use crate::builder::registry::BuildState;
use crate::builder::Builder;
use crate::core::matrix::ConfigEntry;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists};
use crate::util::process::ProcessBuilder;

/// Builds a host library or tool with its autoconf `configure` script.
pub struct AutoconfBuilder {
    name: String,
    src_dir: PathBuf,
    config_list: Vec<ConfigEntry>,
    toolchain: ToolchainSource,
    install_dir: PathBuf,
    config_flags: Vec<String>,
    rpath_to_toolchain: bool,
    after_install: Vec<EntryHook>,
}

impl AutoconfBuilder {
    pub fn new(
        name: impl Into<String>,
        src_dir: impl Into<PathBuf>,
        config_list: Vec<ConfigEntry>,
        install_dir: impl Into<PathBuf>,
    ) -> Self {
        AutoconfBuilder {
            name: name.into(),
            src_dir: src_dir.into(),
            config_list,
            toolchain: ToolchainSource::Runtime,
            install_dir: install_dir.into(),
            config_flags: Vec::new(),
            rpath_to_toolchain: false,
            after_install: Vec::new(),
        }
    }

    /// Extra arguments for `configure`.
    pub fn config_flag(mut self, flag: impl Into<String>) -> Self {
        self.config_flags.push(flag.into());
        self
    }

    /// Link against the toolchain's libc++ with an rpath to it.
    pub fn rpath_to_toolchain(mut self) -> Self {
        self.rpath_to_toolchain = true;
        self
    }

    pub fn after_install(mut self, hook: EntryHook) -> Self {
        self.after_install.push(hook);
        self
    }

    fn env(
        &self,
        ctx: &BuildContext,
        entry: &ConfigEntry,
        cc: &Path,
        cxx: &Path,
        lib_dir: &Path,
    ) -> Vec<(String, String)> {
        let mut cflags = Vec::new();
        let mut ldflags = Vec::new();
        if let Some(os) = entry.native_host() {
            let (c, l) = flags::host_gcc_toolchain_flags(&ctx.paths, os, entry.is_32_bit());
            cflags.extend(c);
            ldflags.extend(l);
        }
        if let Some(sysroot) = entry.sysroot(&ctx.paths) {
            cflags.push(format!("--sysroot={}", sysroot.display()));
        }
        cflags.push("-fPIC".to_string());
        if self.rpath_to_toolchain {
            ldflags.push(format!("-Wl,-rpath,{}", lib_dir.display()));
        }

        let cflags = cflags.join(" ");
        vec![
            ("CC".to_string(), cc.display().to_string()),
            ("CXX".to_string(), cxx.display().to_string()),
            ("CFLAGS".to_string(), cflags.clone()),
            ("CXXFLAGS".to_string(), format!("{} -stdlib=libc++", cflags)),
            ("LDFLAGS".to_string(), ldflags.join(" ")),
        ]
    }
}

impl Builder for AutoconfBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_list(&self) -> &[ConfigEntry] {
        &self.config_list
    }

    fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    fn install_dir(&self, _ctx: &BuildContext, _entry: &ConfigEntry) -> Result<PathBuf> {
        Ok(self.install_dir.clone())
    }

    fn prepare(&self, _ctx: &mut BuildContext) -> Result<()> {
        remove_dir_all_if_exists(&self.install_dir)
    }

    fn build_entry(&self, ctx: &mut BuildContext, entry: &ConfigEntry) -> Result<()> {
        let toolchain = ctx.toolchain_for(&self.toolchain)?;
        let output_dir = self.output_dir(ctx, entry);
        remove_dir_all_if_exists(&output_dir)?;
        ensure_dir(&output_dir)?;

        let vars = self.env(ctx, entry, &toolchain.cc(), &toolchain.cxx(), &toolchain.lib_dir());
        let command = |program: &Path| {
            let mut cmd = ProcessBuilder::new(program)
                .cwd(&output_dir)
                .env_clear()
                .envs(&ctx.base_env);
            for (key, value) in &vars {
                cmd = cmd.env(key, value);
            }
            cmd
        };

        let configure = command(&self.src_dir.join("configure"))
            .arg(format!("--prefix={}", self.install_dir.display()))
            .args(&self.config_flags);
        let mut make = command(Path::new("make"));
        if let Some(jobs) = ctx.jobs {
            make = make.arg(format!("-j{}", jobs));
        }
        let install = command(Path::new("make")).arg("install");

        ctx.builders.transition(&self.name, BuildState::Configuring)?;
        tracing::info!("Configuring {} in {}", self.name, output_dir.display());
        ctx.runner
            .run(&configure)
            .with_context(|| format!("configure step failed for {}", self.name))?;

        ctx.builders.transition(&self.name, BuildState::Compiling)?;
        tracing::info!("Compiling {}", self.name);
        ctx.runner
            .run(&make)
            .with_context(|| format!("build step failed for {}", self.name))?;

        ctx.builders.transition(&self.name, BuildState::Installing)?;
        tracing::info!("Installing {} to {}", self.name, self.install_dir.display());
        ctx.runner
            .run(&install)
            .with_context(|| format!("install step failed for {}", self.name))?;

        let cx = EntryContext {
            ctx,
            builder: &self.name,
            entry,
            toolchain: &toolchain,
            src_dir: &self.src_dir,
            output_dir: &output_dir,
            install_dir: &self.install_dir,
        };
        for hook in &self.after_install {
            hook(&cx).with_context(|| format!("post-install step failed for {}", self.name))?;
        }
        Ok(())
    }
}
