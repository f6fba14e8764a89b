//! Command implementations

pub mod build;
pub mod list;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::cli::{CommonArgs, FilterArgs};
use stagehand::builder::{BuildContext, SystemRunner};
use stagehand::core::{Host, Paths};
use stagehand::ops::PipelineOptions;
use stagehand::util::config::{global_config_path, load_config, PROJECT_CONFIG};
use stagehand::util::Config;

/// Load the global configuration merged under the project one.
fn load(common: &CommonArgs) -> Result<Config> {
    let project = match &common.config {
        Some(path) if !path.is_file() => {
            bail!(
                "config file {} not found\n\
                 hint: drop --config to use ./{}",
                path.display(),
                PROJECT_CONFIG
            );
        }
        Some(path) => path.clone(),
        None => PathBuf::from(PROJECT_CONFIG),
    };
    load_config(global_config_path().as_deref(), &project)
}

/// A build context for this machine, running real commands.
fn context(config: &Config) -> BuildContext {
    let host = Host::build_host();
    let paths = Paths::new(config, host);
    tracing::debug!("paths: {:?}", paths);
    BuildContext::new(paths, host, Arc::new(SystemRunner)).with_jobs(config.build.jobs)
}

/// Pipeline options from configuration and the shared flags.
fn pipeline_options(config: &Config, common: &CommonArgs, filter: &FilterArgs) -> PipelineOptions {
    PipelineOptions {
        build_name: common.build_name.clone(),
        revision: config.build.revision(common.build_llvm_next).to_string(),
        clang_vendor: config.toolchain.clang_vendor.clone(),
        patch_level: config.build.patch_level.clone(),
        patch_sources: config.build.patch_sources.unwrap_or(true),
        build: filter.build.clone(),
        skip: filter.skip.clone(),
        skip_build: filter.skip_build,
        no_build: common.no_build.clone(),
        ..Default::default()
    }
}
