//! Test utilities and mocks for stagehand unit tests.
//!
//! Builders never spawn processes directly; they go through a
//! [`CommandRunner`]. [`MockRunner`] records every command instead of
//! running it and can be told to fail on chosen commands, which lets the
//! pipeline be exercised end to end inside a temporary directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use stagehand::test_support::{MockRunner, TestEnv};
//!
//! #[test]
//! fn test_example() {
//!     let mut env = TestEnv::new(MockRunner::new().fail_when("cmake", "stage2"));
//!     // Register builders on env.ctx and build them...
//!     assert_eq!(env.runner.calls()[0].program, "cmake");
//! }
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::TempDir;

use crate::builder::{BuildContext, BuildError, Builder, CommandRunner};
use crate::core::host::Host;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;
use crate::util::config::Config;
use crate::util::process::ProcessBuilder;

pub use fixtures::*;

/// Version written into the fake bootstrap prebuilt.
pub const PREBUILT_VERSION: (u32, u32, u32) = (11, 0, 2);

/// A command the mock runner was asked to run.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// File name of the program
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub env_clear: bool,
}

impl RecordedCall {
    fn from_process(cmd: &ProcessBuilder) -> Self {
        let program = cmd
            .get_program()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        RecordedCall {
            program,
            args: cmd.get_args().to_vec(),
            cwd: cmd.get_cwd().map(Path::to_path_buf),
            env: cmd.get_env().clone(),
            env_clear: cmd.is_env_clear(),
        }
    }

    /// Whether any argument or the working directory contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a.contains(needle))
            || self
                .cwd
                .as_ref()
                .is_some_and(|c| c.to_string_lossy().contains(needle))
    }

    /// Value of a `-DKEY=VALUE` argument.
    pub fn define(&self, key: &str) -> Option<&str> {
        let prefix = format!("-D{}=", key);
        self.args.iter().find_map(|a| a.strip_prefix(&prefix))
    }
}

/// Pattern for commands the mock runner should fail.
#[derive(Debug, Clone)]
struct FailurePattern {
    program: String,
    needle: String,
}

/// Records commands instead of running them.
#[derive(Debug, Default)]
pub struct MockRunner {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Vec<FailurePattern>,
    toolchain_version: Option<(u32, u32, u32)>,
}

impl MockRunner {
    /// A runner where every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail calls to `program` that mention `needle` in an argument or
    /// their working directory.
    pub fn fail_when(mut self, program: &str, needle: &str) -> Self {
        self.failures.push(FailurePattern {
            program: program.to_string(),
            needle: needle.to_string(),
        });
        self
    }

    /// When an LLVM tree is configured, write a version header into its
    /// install prefix so the result is usable as a toolchain.
    pub fn installing_toolchains(mut self, version: (u32, u32, u32)) -> Self {
        self.toolchain_version = Some(version);
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().clone()
    }

    /// Configure calls whose working directory ends with `dir_name`.
    pub fn configures_in(&self, dir_name: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == "cmake")
            .filter(|c| c.cwd.as_deref().is_some_and(|d| d.ends_with(dir_name)))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<()> {
        let call = RecordedCall::from_process(cmd);
        self.lock().push(call.clone());

        let failed = self
            .failures
            .iter()
            .any(|f| f.program == call.program && call.mentions(&f.needle));
        if failed {
            return Err(BuildError::CommandFailed {
                command: cmd.display_command(),
                code: Some(1),
                stdout: String::new(),
                stderr: "mock failure".to_string(),
            }
            .into());
        }

        if let Some(version) = self.toolchain_version {
            if call.program == "cmake" && call.define("LLVM_ENABLE_PROJECTS").is_some() {
                if let Some(prefix) = call.define("CMAKE_INSTALL_PREFIX") {
                    write_version_header(Path::new(prefix), version);
                }
            }
        }
        Ok(())
    }
}

/// A builder that does nothing but carry a name.
pub struct NamedBuilder {
    name: String,
    config_list: Vec<ConfigEntry>,
    src_dir: PathBuf,
}

impl NamedBuilder {
    pub fn new(name: &str) -> Self {
        NamedBuilder {
            name: name.to_string(),
            config_list: vec![ConfigEntry::host(Host::Linux)],
            src_dir: PathBuf::from("src"),
        }
    }
}

impl Builder for NamedBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_list(&self) -> &[ConfigEntry] {
        &self.config_list
    }

    fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    fn install_dir(&self, ctx: &BuildContext, _entry: &ConfigEntry) -> Result<PathBuf> {
        Ok(ctx.paths.out_path(format!("{}-install", self.name)))
    }

    fn build_entry(&self, _ctx: &mut BuildContext, _entry: &ConfigEntry) -> Result<()> {
        Ok(())
    }
}

/// Create `root/name` as a toolchain install reporting `version`.
pub fn fake_install(root: &Path, name: &str, version: (u32, u32, u32)) -> PathBuf {
    let install = root.join(name);
    write_version_header(&install, version);
    install
}

fn write_version_header(install: &Path, (major, minor, patch): (u32, u32, u32)) {
    let header = install.join(crate::core::version::VERSION_HEADER);
    std::fs::create_dir_all(header.parent().unwrap()).unwrap();
    std::fs::write(
        &header,
        format!(
            "#define CLANG_VERSION {major}.{minor}.{patch}\n\
             #define CLANG_VERSION_STRING \"{major}.{minor}.{patch}\"\n\
             #define CLANG_VERSION_MAJOR {major}\n\
             #define CLANG_VERSION_MINOR {minor}\n\
             #define CLANG_VERSION_PATCHLEVEL {patch}\n"
        ),
    )
    .unwrap();
}

/// A build context rooted in a temporary source tree, with a fake
/// bootstrap prebuilt and a recording runner.
pub struct TestEnv {
    pub tmp: TempDir,
    pub paths: Paths,
    pub runner: Arc<MockRunner>,
    pub ctx: BuildContext,
}

impl TestEnv {
    pub fn new(runner: MockRunner) -> Self {
        let tmp = TempDir::new().unwrap();
        let paths = test_paths(tmp.path());

        let prebuilt = &paths.prebuilt_clang;
        fake_install(
            prebuilt.parent().unwrap(),
            prebuilt.file_name().unwrap().to_str().unwrap(),
            PREBUILT_VERSION,
        );

        let runner = Arc::new(runner);
        let base_env = BTreeMap::from([
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("STAGEHAND_TEST_BASE".to_string(), "1".to_string()),
        ]);
        let ctx = BuildContext::new(paths.clone(), Host::Linux, runner.clone())
            .with_base_env(base_env);

        TestEnv {
            tmp,
            paths,
            runner,
            ctx,
        }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }
}

/// Paths for a source tree at `root`, independent of the process environment.
pub fn test_paths(root: &Path) -> Paths {
    let mut config = Config::default();
    config.paths.android_root = Some(root.to_path_buf());
    config.toolchain.cmake = Some(PathBuf::from("/usr/bin/cmake"));
    config.toolchain.ninja = Some(PathBuf::from("/usr/bin/ninja"));

    let mut paths = Paths::new(&config, Host::Linux);
    paths.out_dir = root.join("out");
    paths.dist_dir = root.join("out/dist");
    paths.llvm_src = paths.out_dir.join("llvm-project");
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_records_and_fails() {
        let runner = MockRunner::new().fail_when("ninja", "install");
        runner
            .run(&ProcessBuilder::new("/usr/bin/ninja").cwd("/out/stage1"))
            .unwrap();
        let err = runner
            .run(&ProcessBuilder::new("/usr/bin/ninja").arg("install"))
            .unwrap_err();

        assert!(err.to_string().contains("ninja install"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "ninja");
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new("/out/stage1")));
    }

    #[test]
    fn test_fake_install_is_a_toolchain() {
        let tmp = TempDir::new().unwrap();
        let install = fake_install(tmp.path(), "clang", (12, 0, 1));
        let version = crate::core::version::ClangVersion::from_install(&install).unwrap();
        assert_eq!(version.long_version(), "12.0.1");
    }

    #[test]
    fn test_env_has_bootstrap_prebuilt() {
        let env = TestEnv::new(MockRunner::new());
        let runtime = env.ctx.toolchains.runtime();
        assert_eq!(runtime.path(), env.paths.prebuilt_clang);
        assert_eq!(runtime.version().unwrap().long_version(), "11.0.2");
        assert!(env.paths.out_dir.starts_with(env.root()));
    }
}
