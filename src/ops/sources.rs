//! Source tree setup.
//!
//! The upstream tree is copied next to the build source directory, patched
//! there, and only moved into place when its content differs from what is
//! already there. Unchanged sources keep earlier build outputs valid.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::BuildContext;
use crate::util::fs::{copy_dir_all, remove_dir_all_if_exists};
use crate::util::hash::sha256_tree;
use crate::util::process::ProcessBuilder;

/// What `setup_sources` did to the build source directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceUpdate {
    /// There was no source directory yet
    Created,
    /// The previous sources differed and were replaced
    Replaced,
    /// The previous sources were identical and kept
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Apply the local patch set
    pub patch: bool,
    /// Revision the patch set is selected for, e.g. `r383902`
    pub revision: String,
}

/// `<dir>.tmp`, beside `dir`.
fn staging_dir(dir: &Path) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("src"));
    name.push(".tmp");
    dir.with_file_name(name)
}

/// Prepare `ctx.paths.llvm_src` from `ctx.paths.llvm_upstream`.
pub fn setup_sources(ctx: &BuildContext, opts: &SourceOptions) -> Result<SourceUpdate> {
    let upstream = &ctx.paths.llvm_upstream;
    let source_dir = &ctx.paths.llvm_src;
    let staging = staging_dir(source_dir);

    if !upstream.is_dir() {
        anyhow::bail!("upstream sources not found at {}", upstream.display());
    }

    tracing::info!("Copying {} to {}", upstream.display(), staging.display());
    remove_dir_all_if_exists(&staging)?;
    copy_dir_all(upstream, &staging)?;

    if opts.patch {
        apply_patches(ctx, &staging, &opts.revision)?;
    }

    if !source_dir.exists() {
        std::fs::rename(&staging, source_dir)
            .with_context(|| format!("failed to move sources to {}", source_dir.display()))?;
        return Ok(SourceUpdate::Created);
    }

    if sha256_tree(&staging)? == sha256_tree(source_dir)? {
        tracing::info!("Sources in {} are up to date", source_dir.display());
        remove_dir_all_if_exists(&staging)?;
        return Ok(SourceUpdate::Unchanged);
    }

    tracing::info!("Sources changed, replacing {}", source_dir.display());
    remove_dir_all_if_exists(source_dir)?;
    std::fs::rename(&staging, source_dir)
        .with_context(|| format!("failed to move sources to {}", source_dir.display()))?;
    Ok(SourceUpdate::Replaced)
}

/// Run the patch manager against `source_dir`.
fn apply_patches(ctx: &BuildContext, source_dir: &Path, revision: &str) -> Result<()> {
    let patches = ctx.paths.patches_dir();
    let svn_version = revision.strip_prefix('r').unwrap_or(revision);

    let cmd = ProcessBuilder::new(ctx.paths.patch_manager())
        .args(["--svn_version", svn_version])
        .arg("--patch_metadata_file")
        .arg(patches.join("PATCHES.json"))
        .arg("--filesdir_path")
        .arg(&patches)
        .arg("--src_path")
        .arg(source_dir)
        .args(["--failure_mode", "fail"])
        .env_clear()
        .envs(&ctx.base_env);
    tracing::info!("Applying patches from {}", patches.display());
    ctx.runner
        .run(&cmd)
        .with_context(|| format!("failed to patch {}", source_dir.display()))
}
