//! Configuration file support for Stagehand.
//!
//! Two configuration file locations are consulted:
//! - Global: `<config dir>/stagehand/config.toml` - User-wide defaults
//! - Project: `stagehand.toml` in the working directory - Tree-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the project configuration file.
pub const PROJECT_CONFIG: &str = "stagehand.toml";

/// Stagehand configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source and output locations
    pub paths: PathsConfig,

    /// Bootstrap toolchain and external tools
    pub toolchain: ToolchainConfig,

    /// Build settings
    pub build: BuildConfig,
}

/// Source and output locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathsConfig {
    /// Root of the source tree (defaults to $ANDROID_BUILD_TOP, then cwd)
    pub android_root: Option<PathBuf>,

    /// Intermediate output directory ($OUT_DIR wins when set)
    pub out_dir: Option<PathBuf>,

    /// Distribution directory ($DIST_DIR wins when set)
    pub dist_dir: Option<PathBuf>,

    /// Windows SDK tree used by the Windows toolchain build
    pub win_sdk: Option<PathBuf>,
}

/// Bootstrap toolchain and external tool locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolchainConfig {
    /// Directory name of the prebuilt clang used for stage1
    pub prebuilt_version: Option<String>,

    /// Vendor string embedded in `clang --version`
    pub clang_vendor: Option<String>,

    /// Path to the configure tool
    pub cmake: Option<PathBuf>,

    /// Path to the build executor
    pub ninja: Option<PathBuf>,
}

/// Build settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Upstream revision being built (e.g. "r383902")
    pub revision: Option<String>,

    /// Upstream revision used with --build-llvm-next
    pub revision_next: Option<String>,

    /// Parallel jobs passed to the build executor (None = executor default)
    pub jobs: Option<usize>,

    /// Apply local patches on top of upstream sources
    pub patch_sources: Option<bool>,

    /// Value stamped into LLVM_VERSION_PATCH and CLANG_VERSION_PATCHLEVEL
    pub patch_level: Option<String>,
}

/// Revision used when none is configured.
pub const DEFAULT_REVISION: &str = "r383902";

impl BuildConfig {
    /// The upstream revision to build and to stamp into packages.
    pub fn revision(&self, llvm_next: bool) -> &str {
        let next = if llvm_next {
            self.revision_next.as_deref()
        } else {
            None
        };
        next.or(self.revision.as_deref())
            .unwrap_or(DEFAULT_REVISION)
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        fn take<T>(slot: &mut Option<T>, other: Option<T>) {
            if other.is_some() {
                *slot = other;
            }
        }

        take(&mut self.paths.android_root, other.paths.android_root);
        take(&mut self.paths.out_dir, other.paths.out_dir);
        take(&mut self.paths.dist_dir, other.paths.dist_dir);
        take(&mut self.paths.win_sdk, other.paths.win_sdk);

        take(&mut self.toolchain.prebuilt_version, other.toolchain.prebuilt_version);
        take(&mut self.toolchain.clang_vendor, other.toolchain.clang_vendor);
        take(&mut self.toolchain.cmake, other.toolchain.cmake);
        take(&mut self.toolchain.ninja, other.toolchain.ninja);

        take(&mut self.build.revision, other.build.revision);
        take(&mut self.build.revision_next, other.build.revision_next);
        take(&mut self.build.jobs, other.build.jobs);
        take(&mut self.build.patch_sources, other.build.patch_sources);
        take(&mut self.build.patch_level, other.build.patch_level);
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "stagehand", "stagehand")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (`stagehand.toml`, or the explicit `--config` path)
/// 2. Global config
/// 3. Defaults
///
/// A malformed file is an error; a missing one is not.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path)?);
    }

    config.merge(Config::load_or_default(project_path)?);

    Ok(config)
}
