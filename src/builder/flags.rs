//! Compiler and linker flags derived from the target of a configuration entry.

use std::path::Path;

use crate::builder::toolchain::ToolchainHandle;
use crate::core::host::Host;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;

/// Minimum macOS version for Darwin host binaries.
pub const MAC_MIN_VERSION: &str = "10.10";

const GCC_VERSION: &str = "4.8.3";

/// Strip the source tree root from debug info.
pub fn debug_prefix_flag(paths: &Paths) -> String {
    format!("-fdebug-prefix-map={}=", paths.android_root.display())
}

/// Flags that point clang at the prebuilt host GCC toolchain for its
/// headers, crt objects and libgcc.
pub fn host_gcc_toolchain_flags(
    paths: &Paths,
    target: Host,
    is_32_bit: bool,
) -> (Vec<String>, Vec<String>) {
    let mut cflags = vec![debug_prefix_flag(paths)];
    let mut ldflags = Vec::new();

    let triple = match target {
        Host::Darwin => return (cflags, ldflags),
        Host::Linux => "x86_64-linux",
        Host::Windows => "x86_64-w64-mingw32",
    };
    let gcc_root = paths.gcc_root(target);

    if target.is_linux() {
        cflags.push(format!("--gcc-toolchain={}", gcc_root.display()));
    }
    cflags.push(format!("-B{}", gcc_root.join(triple).join("bin").display()));

    let mut gcc_lib_dir = gcc_root.join("lib/gcc").join(triple).join(GCC_VERSION);
    let mut gcc_builtin_dir = gcc_root.join(triple).join("lib64");
    if is_32_bit {
        gcc_lib_dir = gcc_lib_dir.join("32");
        gcc_builtin_dir = gcc_root.join(triple).join("lib32");
    }

    for dir in [&gcc_lib_dir, &gcc_builtin_dir] {
        ldflags.push(format!("-B{}", dir.display()));
        ldflags.push(format!("-L{}", dir.display()));
    }
    ldflags.push("-fuse-ld=lld".to_string());

    (cflags, ldflags)
}

/// Target flags for a mingw cross build of the Windows toolchain.
pub fn windows_target_flags(entry: &ConfigEntry) -> (Vec<String>, Vec<String>) {
    let target = format!("--target={}", entry.target_triple());
    let cflags = vec![
        target.clone(),
        "-D_LARGEFILE_SOURCE".to_string(),
        "-D_FILE_OFFSET_BITS=64".to_string(),
        "-D_WIN32_WINNT=0x0600".to_string(),
        "-DWINVER=0x0600".to_string(),
        "-D__MSVCRT_VERSION__=0x1400".to_string(),
    ];
    (cflags, vec![target])
}

/// Target flags for a device runtime library.
pub fn device_flags(
    paths: &Paths,
    entry: &ConfigEntry,
    toolchain: &ToolchainHandle,
    suppress_libcxx_headers: bool,
) -> (Vec<String>, Vec<String>) {
    let api = entry.api_level().unwrap_or_default();
    let target = format!("--target={}{}", entry.target_triple(), api);

    let mut cflags = vec![
        target.clone(),
        format!("-D__ANDROID_API__={}", api),
        "-ffunction-sections".to_string(),
        "-fdata-sections".to_string(),
        debug_prefix_flag(paths),
    ];
    if !suppress_libcxx_headers {
        cflags.push("-nostdinc++".to_string());
        cflags.push(format!("-isystem {}", libcxx_headers(toolchain.path()).display()));
    }

    let ldflags = vec![
        target,
        "-fuse-ld=lld".to_string(),
        "-Wl,--gc-sections".to_string(),
        "-Wl,--build-id=sha1".to_string(),
    ];
    (cflags, ldflags)
}

fn libcxx_headers(install: &Path) -> std::path::PathBuf {
    install.join("include").join("c++").join("v1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::Arch;
    use crate::core::matrix::{SysrootKind, TargetPlatform, Variant};
    use crate::util::config::Config;

    fn paths() -> Paths {
        let mut config = Config::default();
        config.paths.android_root = Some("/src".into());
        config.paths.out_dir = Some("/src/out".into());
        Paths::new(&config, Host::Linux)
    }

    #[test]
    fn test_linux_gcc_flags() {
        let (cflags, ldflags) = host_gcc_toolchain_flags(&paths(), Host::Linux, false);
        let root = "/src/prebuilts/gcc/linux-x86/host/x86_64-linux-glibc2.17-4.8";

        assert_eq!(cflags[0], "-fdebug-prefix-map=/src=");
        assert_eq!(cflags[1], format!("--gcc-toolchain={root}"));
        assert_eq!(cflags[2], format!("-B{root}/x86_64-linux/bin"));
        assert_eq!(
            ldflags,
            [
                format!("-B{root}/lib/gcc/x86_64-linux/4.8.3"),
                format!("-L{root}/lib/gcc/x86_64-linux/4.8.3"),
                format!("-B{root}/x86_64-linux/lib64"),
                format!("-L{root}/x86_64-linux/lib64"),
                "-fuse-ld=lld".to_string(),
            ]
        );
    }

    #[test]
    fn test_32_bit_gcc_dirs() {
        let (_, ldflags) = host_gcc_toolchain_flags(&paths(), Host::Linux, true);
        assert!(ldflags[0].ends_with("/lib/gcc/x86_64-linux/4.8.3/32"));
        assert!(ldflags[2].ends_with("/x86_64-linux/lib32"));
    }

    #[test]
    fn test_windows_has_no_gcc_toolchain_flag() {
        let (cflags, _) = host_gcc_toolchain_flags(&paths(), Host::Windows, false);
        assert!(!cflags.iter().any(|f| f.starts_with("--gcc-toolchain")));
        assert!(cflags.iter().any(|f| f.ends_with("x86_64-w64-mingw32/bin")));
    }

    #[test]
    fn test_darwin_only_gets_prefix_map() {
        let (cflags, ldflags) = host_gcc_toolchain_flags(&paths(), Host::Darwin, false);
        assert_eq!(cflags.len(), 1);
        assert!(ldflags.is_empty());
    }

    #[test]
    fn test_device_flags() {
        let entry = ConfigEntry::new(
            Arch::Aarch64,
            TargetPlatform::Device(SysrootKind::Ndk),
            Variant::Default,
        )
        .unwrap();
        let toolchain = ToolchainHandle::prebuilt("/tc");

        let (cflags, ldflags) = device_flags(&paths(), &entry, &toolchain, false);
        assert_eq!(cflags[0], "--target=aarch64-linux-android21");
        assert!(cflags.contains(&"-D__ANDROID_API__=21".to_string()));
        assert!(cflags.contains(&"-isystem /tc/include/c++/v1".to_string()));
        assert!(ldflags.contains(&"-fuse-ld=lld".to_string()));

        let (cflags, _) = device_flags(&paths(), &entry, &toolchain, true);
        assert!(!cflags.contains(&"-nostdinc++".to_string()));
    }
}
