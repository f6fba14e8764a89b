//! Composition of per-entry configuration.
//!
//! A CMake builder's configuration for one entry is assembled by applying an
//! ordered list of [`ConfigLayer`]s to an empty [`EntryConfig`]. Later layers
//! see what earlier ones wrote and may override it; defines are
//! last-writer-wins per key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::context::BuildContext;
use crate::builder::flags::{self, MAC_MIN_VERSION};
use crate::builder::toolchain::ToolchainHandle;
use crate::core::host::Host;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;

/// Everything a layer or hook may consult for one entry.
pub struct EntryContext<'a> {
    pub ctx: &'a BuildContext,
    pub builder: &'a str,
    pub entry: &'a ConfigEntry,
    pub toolchain: &'a ToolchainHandle,
    pub src_dir: &'a Path,
    pub output_dir: &'a Path,
    pub install_dir: &'a Path,
}

impl EntryContext<'_> {
    pub fn paths(&self) -> &Paths {
        &self.ctx.paths
    }

    /// The machine running the build.
    pub fn host(&self) -> Host {
        self.ctx.host
    }

    /// The OS this entry's binaries run on, for native entries.
    pub fn target_os(&self) -> Option<Host> {
        self.entry.native_host()
    }

    pub fn sysroot(&self) -> Option<PathBuf> {
        self.entry.sysroot(&self.ctx.paths)
    }
}

/// Merged configuration for one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryConfig {
    pub defines: BTreeMap<String, String>,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub ldflags: Vec<String>,
    /// Variables added on top of the base environment
    pub env: BTreeMap<String, String>,
}

impl EntryConfig {
    pub fn define(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.defines.insert(key.to_string(), value.into());
        self
    }

    pub fn define_path(&mut self, key: &str, value: impl AsRef<Path>) -> &mut Self {
        self.define(key, value.as_ref().display().to_string())
    }

    pub fn define_bool(&mut self, key: &str, on: bool) -> &mut Self {
        self.define(key, if on { "ON" } else { "OFF" })
    }

    pub fn undefine(&mut self, key: &str) -> &mut Self {
        self.defines.remove(key);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.defines.get(key).map(String::as_str)
    }

    /// The C flags as they will be passed to the configure step.
    pub fn c_flags(&self) -> String {
        self.cflags.join(" ")
    }

    /// Defines with the accumulated flags folded in.
    pub fn resolved_defines(&self) -> BTreeMap<String, String> {
        let mut defines = self.defines.clone();
        let cflags = self.c_flags();
        let cxxflags = self
            .cflags
            .iter()
            .chain(&self.cxxflags)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let ldflags = self.ldflags.join(" ");

        defines.insert("CMAKE_ASM_FLAGS".into(), cflags.clone());
        defines.insert("CMAKE_C_FLAGS".into(), cflags);
        defines.insert("CMAKE_CXX_FLAGS".into(), cxxflags);
        for key in [
            "CMAKE_EXE_LINKER_FLAGS",
            "CMAKE_SHARED_LINKER_FLAGS",
            "CMAKE_MODULE_LINKER_FLAGS",
        ] {
            defines.insert(key.into(), ldflags.clone());
        }
        defines
    }

    /// `-DKEY=VALUE` arguments for the configure step, sorted by key.
    pub fn cmake_args(&self) -> Vec<String> {
        self.resolved_defines()
            .into_iter()
            .map(|(k, v)| format!("-D{}={}", k, v))
            .collect()
    }
}

/// One step in assembling an entry's configuration.
pub trait ConfigLayer: Send + Sync {
    fn apply(&self, cx: &EntryContext<'_>, cfg: &mut EntryConfig) -> Result<()>;
}

struct FnLayer<F>(F);

impl<F> ConfigLayer for FnLayer<F>
where
    F: Fn(&EntryContext<'_>, &mut EntryConfig) -> Result<()> + Send + Sync,
{
    fn apply(&self, cx: &EntryContext<'_>, cfg: &mut EntryConfig) -> Result<()> {
        (self.0)(cx, cfg)
    }
}

/// Wrap a closure as a layer.
pub fn layer<F>(f: F) -> Box<dyn ConfigLayer>
where
    F: Fn(&EntryContext<'_>, &mut EntryConfig) -> Result<()> + Send + Sync + 'static,
{
    Box::new(FnLayer(f))
}

/// Apply `layers` in order to an empty configuration.
pub fn compose(layers: &[Box<dyn ConfigLayer>], cx: &EntryContext<'_>) -> Result<EntryConfig> {
    let mut cfg = EntryConfig::default();
    for layer in layers {
        layer.apply(cx, &mut cfg)?;
    }
    Ok(cfg)
}

/// Compilers, build type, install prefix, make program, sysroot and the
/// host toolchain flags for native entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseCMakeLayer;

impl ConfigLayer for BaseCMakeLayer {
    fn apply(&self, cx: &EntryContext<'_>, cfg: &mut EntryConfig) -> Result<()> {
        let tc = cx.toolchain;
        cfg.define_path("CMAKE_C_COMPILER", tc.cc())
            .define_path("CMAKE_CXX_COMPILER", tc.cxx())
            .define("CMAKE_BUILD_TYPE", "Release")
            .define_path("CMAKE_INSTALL_PREFIX", cx.install_dir)
            .define_path("CMAKE_MAKE_PROGRAM", &cx.paths().ninja);

        if let Some(sysroot) = cx.sysroot() {
            cfg.define_path("CMAKE_SYSROOT", sysroot)
                .define("CMAKE_FIND_ROOT_PATH_MODE_INCLUDE", "ONLY")
                .define("CMAKE_FIND_ROOT_PATH_MODE_LIBRARY", "ONLY")
                .define("CMAKE_FIND_ROOT_PATH_MODE_PACKAGE", "ONLY")
                .define("CMAKE_FIND_ROOT_PATH_MODE_PROGRAM", "NEVER");
        }

        if let Some(os) = cx.target_os() {
            let (cflags, ldflags) =
                flags::host_gcc_toolchain_flags(cx.paths(), os, cx.entry.is_32_bit());
            cfg.cflags.extend(cflags);
            cfg.ldflags.extend(ldflags);

            if os.is_windows() {
                let (cflags, ldflags) = flags::windows_target_flags(cx.entry);
                cfg.cflags.extend(cflags);
                cfg.ldflags.extend(ldflags);
                cfg.define("CMAKE_SYSTEM_NAME", "Windows")
                    .define_path("CMAKE_RC_COMPILER", tc.bin_dir().join("llvm-windres"));
            }
        }
        Ok(())
    }
}

/// Targets built by the host stages that only need to run on the build machine.
pub const BASE_TARGETS: &[&str] = &["X86"];

/// Every target the shipped toolchain supports.
pub const ANDROID_TARGETS: &[&str] = &["AArch64", "ARM", "BPF", "X86"];

/// Defines common to builds of the LLVM tree itself.
#[derive(Debug, Clone, Default)]
pub struct LlvmLayer {
    pub projects: Vec<&'static str>,
    pub targets: Vec<&'static str>,
    pub enable_assertions: bool,
    pub clang_vendor: Option<String>,
    pub patch_level: Option<String>,
}

impl LlvmLayer {
    pub fn new(projects: &[&'static str], targets: &[&'static str]) -> Self {
        LlvmLayer {
            projects: projects.to_vec(),
            targets: targets.to_vec(),
            ..Default::default()
        }
    }
}

impl ConfigLayer for LlvmLayer {
    fn apply(&self, cx: &EntryContext<'_>, cfg: &mut EntryConfig) -> Result<()> {
        let mut projects = self.projects.clone();
        projects.sort_unstable();
        let mut targets = self.targets.clone();
        targets.sort_unstable();

        cfg.define("LLVM_ENABLE_PROJECTS", projects.join(";"))
            .define("LLVM_TARGETS_TO_BUILD", targets.join(";"))
            .define_bool("LLVM_ENABLE_ASSERTIONS", self.enable_assertions)
            .define("LLVM_ENABLE_TERMINFO", "OFF")
            .define("LLVM_ENABLE_THREADS", "ON")
            .define("LLVM_USE_NEWPM", "ON")
            .define("LLVM_LIBDIR_SUFFIX", "64")
            .define("COMPILER_RT_BUILD_XRAY", "OFF")
            .define("LLVM_BUILD_LLVM_DYLIB", "ON")
            .define("LLVM_ENABLE_LIBCXX", "ON")
            .define(
                "CLANG_REPOSITORY_STRING",
                "https://android.googlesource.com/toolchain/llvm-project",
            )
            .define("BUG_REPORT_URL", "https://github.com/android-ndk/ndk/issues")
            .define_path(
                "LLVM_BINUTILS_INCDIR",
                cx.paths().android_path("toolchain/binutils/binutils-2.27/include"),
            );

        if let Some(patch) = &self.patch_level {
            cfg.define("LLVM_VERSION_PATCH", patch.as_str())
                .define("CLANG_VERSION_PATCHLEVEL", patch.as_str());
        }
        if let Some(vendor) = &self.clang_vendor {
            cfg.define("CLANG_VENDOR", vendor.as_str());
        }
        if cx.target_os() == Some(Host::Darwin) {
            cfg.define("CMAKE_OSX_DEPLOYMENT_TARGET", MAC_MIN_VERSION);
        }
        Ok(())
    }
}

/// Cross-compile defaults for runtime libraries built with the current
/// runtime toolchain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeLayer {
    /// Compile against in-tree libc++ headers rather than the toolchain's
    pub suppress_libcxx_headers: bool,
}

impl ConfigLayer for RuntimeLayer {
    fn apply(&self, cx: &EntryContext<'_>, cfg: &mut EntryConfig) -> Result<()> {
        cfg.define_path("LLVM_CONFIG_PATH", cx.toolchain.bin_dir().join("llvm-config"));

        if !cx.entry.is_device() {
            return Ok(());
        }

        let (cflags, ldflags) = flags::device_flags(
            cx.paths(),
            cx.entry,
            cx.toolchain,
            self.suppress_libcxx_headers,
        );
        cfg.cflags.extend(cflags);
        cfg.ldflags.extend(ldflags);

        let target = format!(
            "{}{}",
            cx.entry.target_triple(),
            cx.entry.api_level().unwrap_or_default()
        );
        cfg.define("CMAKE_SYSTEM_NAME", "Android")
            .define("ANDROID", "1")
            .define("CMAKE_CROSSCOMPILING", "True")
            .define("CMAKE_C_COMPILER_TARGET", target.as_str())
            .define("CMAKE_CXX_COMPILER_TARGET", target.as_str())
            .define("CMAKE_ASM_COMPILER_TARGET", target.as_str())
            .define("CMAKE_C_COMPILER_WORKS", "ON")
            .define("CMAKE_CXX_COMPILER_WORKS", "ON")
            .define_path("CMAKE_AR", cx.toolchain.ar());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_writer_wins() {
        let mut cfg = EntryConfig::default();
        cfg.define("CMAKE_BUILD_TYPE", "Release");
        cfg.define("CMAKE_BUILD_TYPE", "Debug");
        assert_eq!(cfg.get("CMAKE_BUILD_TYPE"), Some("Debug"));

        cfg.undefine("CMAKE_BUILD_TYPE");
        assert_eq!(cfg.get("CMAKE_BUILD_TYPE"), None);
    }

    #[test]
    fn test_flags_fold_into_defines() {
        let mut cfg = EntryConfig::default();
        cfg.cflags = vec!["-O2".into(), "-g".into()];
        cfg.cxxflags = vec!["-fno-rtti".into()];
        cfg.ldflags = vec!["-fuse-ld=lld".into()];

        let defines = cfg.resolved_defines();
        assert_eq!(defines["CMAKE_C_FLAGS"], "-O2 -g");
        assert_eq!(defines["CMAKE_ASM_FLAGS"], "-O2 -g");
        assert_eq!(defines["CMAKE_CXX_FLAGS"], "-O2 -g -fno-rtti");
        assert_eq!(defines["CMAKE_SHARED_LINKER_FLAGS"], "-fuse-ld=lld");
    }

    #[test]
    fn test_cmake_args_are_sorted() {
        let mut cfg = EntryConfig::default();
        cfg.define("ZED", "1").define("ALPHA", "2");
        let args = cfg.cmake_args();
        assert_eq!(args.first().map(String::as_str), Some("-DALPHA=2"));
        assert!(args.contains(&"-DZED=1".to_string()));
    }
}
