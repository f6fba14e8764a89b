//! Compiler installations produced or consumed by the pipeline.
//!
//! A [`ToolchainHandle`] names an install tree plus the build tree it came
//! from. Every other path is derived from those two roots and the clang
//! version recorded in the install.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::core::version::{ClangVersion, VersionError};

mod registry;

pub use registry::{ToolchainError, ToolchainRegistry};

/// An immutable descriptor of a usable compiler installation.
pub struct ToolchainHandle {
    install_root: PathBuf,
    build_root: PathBuf,
    version: OnceLock<ClangVersion>,
}

impl ToolchainHandle {
    /// Describe an installation without touching the filesystem.
    ///
    /// The version is read from the install on first use and cached.
    pub fn from_install(install_root: impl Into<PathBuf>, build_root: impl Into<PathBuf>) -> Self {
        ToolchainHandle {
            install_root: install_root.into(),
            build_root: build_root.into(),
            version: OnceLock::new(),
        }
    }

    /// Describe an installation that has just finished installing, reading
    /// its version immediately.
    pub fn resolve(
        install_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
    ) -> Result<Self, VersionError> {
        let handle = Self::from_install(install_root, build_root);
        let version = ClangVersion::from_install(&handle.install_root)?;
        let _ = handle.version.set(version);
        Ok(handle)
    }

    /// A prebuilt installation; it has no separate build tree.
    pub fn prebuilt(install_root: impl Into<PathBuf>) -> Self {
        let root = install_root.into();
        Self::from_install(root.clone(), root)
    }

    pub fn path(&self) -> &Path {
        &self.install_root
    }

    /// The installed clang version.
    pub fn version(&self) -> Result<&ClangVersion, VersionError> {
        if let Some(version) = self.version.get() {
            return Ok(version);
        }
        let version = ClangVersion::from_install(&self.install_root)?;
        Ok(self.version.get_or_init(|| version))
    }

    pub fn is_resolved(&self) -> bool {
        self.version.get().is_some()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.install_root.join("bin")
    }

    pub fn cc(&self) -> PathBuf {
        self.bin_dir().join("clang")
    }

    pub fn cxx(&self) -> PathBuf {
        self.bin_dir().join("clang++")
    }

    pub fn ar(&self) -> PathBuf {
        self.bin_dir().join("llvm-ar")
    }

    pub fn strip(&self) -> PathBuf {
        self.bin_dir().join("llvm-strip")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.install_root.join("lib64")
    }

    /// `lib64/clang/<long version>`, the compiler's resource root.
    pub fn clang_lib_dir(&self) -> Result<PathBuf, VersionError> {
        Ok(self
            .lib_dir()
            .join("clang")
            .join(self.version()?.long_version()))
    }

    /// Where runtime libraries for Linux-like targets are found.
    pub fn resource_dir(&self) -> Result<PathBuf, VersionError> {
        Ok(self.clang_lib_dir()?.join("lib").join("linux"))
    }

    /// Extra per-NDK runtime libraries shipped next to the toolchain.
    pub fn ndk_runtimes_dir(&self) -> PathBuf {
        self.install_root.join("runtimes_ndk_cxx")
    }

    /// A host tool from the build tree, such as `llvm-tblgen`.
    pub fn build_tool(&self, name: &str) -> PathBuf {
        self.build_root.join("bin").join(name)
    }
}

impl fmt::Debug for ToolchainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolchainHandle")
            .field("install_root", &self.install_root)
            .field("build_root", &self.build_root)
            .field("version", &self.version.get())
            .finish()
    }
}
