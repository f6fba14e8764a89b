//! Builders: configurable units of work that drive an external
//! configure/compile/install cycle once per configuration entry.
//!
//! Builders are registered by name in a [`BuilderRegistry`] and executed
//! against a shared [`BuildContext`]. The context carries the toolchain
//! registry, so a later builder sees the compiler an earlier one installed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::core::matrix::ConfigEntry;

pub mod autoconf;
pub mod cmake;
pub mod context;
pub mod flags;
pub mod layers;
pub mod registry;
pub mod runner;
pub mod stages;
pub mod toolchain;
pub mod win_sdk;

pub use autoconf::AutoconfBuilder;
pub use cmake::{CMakeBuilder, ToolchainSource};
pub use context::BuildContext;
pub use layers::{ConfigLayer, EntryConfig, EntryContext};
pub use registry::{BuildFilter, BuildState, BuilderRegistry, RegistryError};
pub use runner::{CommandRunner, SystemRunner};
pub use toolchain::{ToolchainError, ToolchainHandle, ToolchainRegistry};

/// Failures of the external steps a builder drives.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An external command exited unsuccessfully.
    #[error("`{command}` failed with exit code {code:?}\n{stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// An external command could not be started.
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An artifact a later step depends on was not produced.
    #[error("did not find {}", path.display())]
    MissingArtifact { path: PathBuf },
}

/// What happened when a builder was asked to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    /// Filtered out by the registry; nothing ran.
    Skipped,
}

/// A named unit of work over a list of configuration entries.
pub trait Builder: Send + Sync {
    /// Unique name, used for registry lookups, filtering, and output paths.
    fn name(&self) -> &str;

    /// The entries this builder runs over, in order.
    fn config_list(&self) -> &[ConfigEntry];

    /// Source directory the external tools are pointed at.
    fn src_dir(&self) -> &Path;

    /// Where this builder installs for `entry`.
    fn install_dir(&self, ctx: &BuildContext, entry: &ConfigEntry) -> Result<PathBuf>;

    /// Intermediate output directory for `entry`.
    fn output_dir(&self, ctx: &BuildContext, entry: &ConfigEntry) -> PathBuf {
        ctx.paths
            .out_path(format!("{}{}", self.name(), entry.output_suffix()))
    }

    /// Runs once before the first entry.
    fn prepare(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    /// One full build-and-install cycle for `entry`.
    fn build_entry(&self, ctx: &mut BuildContext, entry: &ConfigEntry) -> Result<()>;

    /// Runs once after every entry has installed.
    fn finish(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    /// Build every entry, or nothing if the registry filters this builder out.
    ///
    /// The builder must be registered in `ctx.builders`. Any entry failure
    /// fails the whole builder; outputs of earlier entries stay on disk.
    fn build(&self, ctx: &mut BuildContext) -> Result<BuildOutcome> {
        let name = self.name().to_string();
        if !ctx.builders.should_build(&name) {
            tracing::info!("Skipping builder {}", name);
            return Ok(BuildOutcome::Skipped);
        }

        ctx.builders.begin(&name)?;
        tracing::info!("Building {} ({} configuration(s))", name, self.config_list().len());
        let start = Instant::now();

        let run = |ctx: &mut BuildContext| -> Result<()> {
            self.prepare(ctx)?;
            for entry in self.config_list() {
                tracing::info!("Building {} for {}", name, entry);
                self.build_entry(ctx, entry)
                    .with_context(|| format!("{} failed for {}", name, entry))?;
            }
            self.finish(ctx)
        };
        let result = run(ctx);

        let elapsed = start.elapsed();
        ctx.timer.record(&name, elapsed);

        match result {
            Ok(()) => {
                ctx.builders.complete(&name, BuildState::Built)?;
                tracing::info!("Finished {} in {:.2}s", name, elapsed.as_secs_f64());
                Ok(BuildOutcome::Built)
            }
            Err(err) => {
                ctx.builders.complete(&name, BuildState::Failed)?;
                Err(err.context(format!("builder `{}` failed", name)))
            }
        }
    }
}
