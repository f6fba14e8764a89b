//! Filesystem layout of the source tree and build outputs.

use std::path::{Path, PathBuf};

use crate::core::host::{Arch, Host};
use crate::core::matrix::SysrootKind;
use crate::util::config::Config;

/// Prebuilt clang used to bootstrap stage1 when none is configured.
pub const DEFAULT_PREBUILT_VERSION: &str = "clang-r383902";

/// NDK release the device sysroots are assembled from.
pub const NDK_VERSION: &str = "r20";

/// Resolved paths for one build run.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root of the checked-out source tree
    pub android_root: PathBuf,
    /// Intermediate build outputs
    pub out_dir: PathBuf,
    /// Final artifacts (packages, reports)
    pub dist_dir: PathBuf,
    /// Patched LLVM sources the builders compile from
    pub llvm_src: PathBuf,
    /// Pristine upstream llvm-project checkout
    pub llvm_upstream: PathBuf,
    /// Bootstrap prebuilt clang installation
    pub prebuilt_clang: PathBuf,
    /// External configure tool
    pub cmake: PathBuf,
    /// External parallel build executor
    pub ninja: PathBuf,
    /// Windows SDK tree, when one is configured
    pub win_sdk: Option<PathBuf>,
    host: Host,
}

impl Paths {
    /// Resolve paths from configuration for the given build host.
    pub fn new(config: &Config, host: Host) -> Paths {
        let android_root = config
            .paths
            .android_root
            .clone()
            .or_else(|| std::env::var_os("ANDROID_BUILD_TOP").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let out_dir = std::env::var_os("OUT_DIR")
            .map(PathBuf::from)
            .or_else(|| config.paths.out_dir.clone())
            .unwrap_or_else(|| android_root.join("out"));

        let dist_dir = std::env::var_os("DIST_DIR")
            .map(PathBuf::from)
            .or_else(|| config.paths.dist_dir.clone())
            .unwrap_or_else(|| out_dir.join("dist"));

        let prebuilt_version = config
            .toolchain
            .prebuilt_version
            .as_deref()
            .unwrap_or(DEFAULT_PREBUILT_VERSION);
        let prebuilt_clang = android_root
            .join("prebuilts/clang/host")
            .join(host.os_tag())
            .join(prebuilt_version);

        let cmake = resolve_tool(
            config.toolchain.cmake.as_deref(),
            &android_root
                .join("prebuilts/cmake")
                .join(host.os_tag())
                .join("bin")
                .join(format!("cmake{}", host.exe_suffix())),
            "cmake",
        );
        let ninja = resolve_tool(
            config.toolchain.ninja.as_deref(),
            &android_root
                .join("prebuilts/ninja")
                .join(host.os_tag())
                .join(format!("ninja{}", host.exe_suffix())),
            "ninja",
        );

        Paths {
            llvm_src: out_dir.join("llvm-project"),
            llvm_upstream: android_root.join("toolchain/llvm-project"),
            prebuilt_clang,
            cmake,
            ninja,
            win_sdk: config.paths.win_sdk.clone(),
            android_root,
            out_dir,
            dist_dir,
            host,
        }
    }

    /// A path inside the LLVM source tree.
    pub fn llvm_path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.llvm_src.join(sub)
    }

    /// A path inside the Android source tree.
    pub fn android_path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.android_root.join(sub)
    }

    /// A path inside the output directory.
    pub fn out_path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.out_dir.join(sub)
    }

    /// Device sysroot assembled by the `sysroots` builder.
    pub fn device_sysroot(&self, kind: SysrootKind, arch: Arch) -> PathBuf {
        self.out_dir
            .join("sysroots")
            .join(kind.as_str())
            .join(arch.ndk_arch())
    }

    /// The NDK the device sysroots start from.
    pub fn ndk_base(&self) -> PathBuf {
        self.android_root
            .join("toolchain/prebuilts/ndk")
            .join(NDK_VERSION)
    }

    /// Root of the prebuilt host GCC toolchain for `target`.
    pub fn gcc_root(&self, target: Host) -> PathBuf {
        let gcc = self
            .android_root
            .join("prebuilts/gcc")
            .join(self.host.os_tag())
            .join("host");
        match target {
            Host::Windows => gcc.join("x86_64-w64-mingw32-4.8"),
            _ => gcc.join("x86_64-linux-glibc2.17-4.8"),
        }
    }

    /// Directory holding the PGO profiles for the host compiler.
    pub fn profiles_dir(&self) -> PathBuf {
        self.android_root
            .join("prebuilts/clang/host/linux-x86/profiles")
    }

    /// Patch metadata and patch files applied on top of upstream sources.
    pub fn patches_dir(&self) -> PathBuf {
        self.android_root.join("toolchain/llvm_android/patches")
    }

    /// The external patch manager script.
    pub fn patch_manager(&self) -> PathBuf {
        self.android_root
            .join("external/toolchain-utils/llvm_tools/patch_manager.py")
    }

    /// Prebuilt zlib used by the Windows toolchain.
    pub fn win_zlib(&self) -> PathBuf {
        self.android_root
            .join("prebuilts/clang/host/windows-x86/toolchain-prebuilts/zlib")
    }

    /// Install tree shared by the Windows libc++ and toolchain builders.
    pub fn windows_install_dir(&self) -> PathBuf {
        self.out_dir.join("windows-x86-64-install")
    }

    /// Where `package_toolchain` assembles an install tree.
    pub fn package_install_dir(&self, host: Host, package_name: &str) -> PathBuf {
        self.out_dir
            .join("install")
            .join(host.os_tag())
            .join(package_name)
    }
}

/// Pick an explicit tool path, else the prebuilt, else whatever is on PATH.
fn resolve_tool(explicit: Option<&Path>, prebuilt: &Path, name: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if prebuilt.exists() {
        return prebuilt.to_path_buf();
    }
    which::which(name).unwrap_or_else(|_| prebuilt.to_path_buf())
}
