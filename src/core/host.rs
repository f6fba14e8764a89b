//! Host operating systems and target architectures.

use std::fmt;

/// An operating system the toolchain can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Host {
    Linux,
    Darwin,
    Windows,
}

impl Host {
    /// Detect the host this process is running on.
    pub fn build_host() -> Host {
        if cfg!(target_os = "macos") {
            Host::Darwin
        } else if cfg!(target_os = "windows") {
            Host::Windows
        } else {
            Host::Linux
        }
    }

    /// Tag used in prebuilt directory names and package names.
    pub fn os_tag(&self) -> &'static str {
        match self {
            Host::Linux => "linux-x86",
            Host::Darwin => "darwin-x86",
            Host::Windows => "windows-x86",
        }
    }

    pub fn is_linux(&self) -> bool {
        matches!(self, Host::Linux)
    }

    pub fn is_darwin(&self) -> bool {
        matches!(self, Host::Darwin)
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Host::Windows)
    }

    /// Suffix appended to executables built for this host.
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() {
            ".exe"
        } else {
            ""
        }
    }

    /// Suffix of shared libraries built for this host.
    pub fn shlib_suffix(&self) -> &'static str {
        match self {
            Host::Linux => ".so",
            Host::Darwin => ".dylib",
            Host::Windows => ".dll",
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Host::Linux => "linux",
            Host::Darwin => "darwin",
            Host::Windows => "windows",
        };
        f.write_str(name)
    }
}

/// A target CPU architecture.
///
/// Declaration order is the order used when expanding configuration matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    Arm,
    Aarch64,
    I386,
    X86_64,
}

impl Arch {
    /// Every architecture shipped for devices.
    pub const DEVICE: [Arch; 4] = [Arch::Arm, Arch::Aarch64, Arch::I386, Arch::X86_64];

    /// Short name, also used for per-arch resource subdirectories.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::I386 => "i386",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Architecture name as it appears in compiler-rt library names.
    pub fn llvm_arch(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::I386 => "i686",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Architecture name used by the NDK sysroot layout.
    pub fn ndk_arch(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "arm64",
            Arch::I386 => "x86",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Clang target triple for Android devices.
    pub fn llvm_triple(&self) -> &'static str {
        match self {
            Arch::Arm => "armv7a-linux-androideabi",
            Arch::Aarch64 => "aarch64-linux-android",
            Arch::I386 => "i686-linux-android",
            Arch::X86_64 => "x86_64-linux-android",
        }
    }

    /// Triple used for the NDK's per-arch library directories.
    pub fn ndk_triple(&self) -> &'static str {
        match self {
            Arch::Arm => "arm-linux-androideabi",
            Arch::Aarch64 => "aarch64-linux-android",
            Arch::I386 => "i686-linux-android",
            Arch::X86_64 => "x86_64-linux-android",
        }
    }

    pub fn is_32_bit(&self) -> bool {
        matches!(self, Arch::Arm | Arch::I386)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
