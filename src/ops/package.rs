//! Packaging of a finished install tree.
//!
//! The tree is copied to `<out>/install/<os_tag>/clang-<build name>`, pruned
//! to the binaries and static libraries that ship, stamped with license and
//! version files, and archived into the dist directory.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::builder::stages::install_into;
use crate::builder::{BuildContext, BuildError};
use crate::core::host::Host;
use crate::core::version::ClangVersion;
use crate::util::fs::{
    copy_dir_all, ensure_dir, glob_files, is_script, read_to_string, remove_dir_all_if_exists,
    remove_file_if_exists, write_string,
};
use crate::util::process::ProcessBuilder;

/// Binaries shipped in every package, without host suffix.
const SHIPPED_BINARIES: &[&str] = &[
    "clang",
    "clang++",
    "clang-check",
    "clang-cl",
    "clang-format",
    "clang-tidy",
    "dsymutil",
    "git-clang-format",
    "ld.lld",
    "ld64.lld",
    "lld",
    "lld-link",
    "llvm-addr2line",
    "llvm-ar",
    "llvm-as",
    "llvm-cfi-verify",
    "llvm-config",
    "llvm-cov",
    "llvm-dis",
    "llvm-dwarfdump",
    "llvm-lib",
    "llvm-link",
    "llvm-modextract",
    "llvm-nm",
    "llvm-objcopy",
    "llvm-objdump",
    "llvm-profdata",
    "llvm-ranlib",
    "llvm-rc",
    "llvm-readelf",
    "llvm-readobj",
    "llvm-size",
    "llvm-strings",
    "llvm-strip",
    "llvm-symbolizer",
    "sancov",
    "sanstats",
    "scan-build",
    "scan-view",
];

/// Shipped binaries that are scripts and never take a host suffix.
const SCRIPTS: &[&str] = &["git-clang-format", "scan-build", "scan-view"];

/// Not shipped in Windows packages.
const WINDOWS_EXCLUDED: &[&str] = &["scan-build", "scan-view"];

const LLDB_BINARIES: &[&str] = &["lldb-argdumper", "lldb"];

const SHIPPED_LIBRARIES: &[&str] = &["libc++.a", "libc++abi.a"];

const WINDOWS_LIBRARIES: &[&str] = &["LLVMgold.dll", "libwinpthread-1.dll"];

/// Projects whose license files make up NOTICE, in order.
const LICENSED_PROJECTS: &[&str] = &[
    "llvm",
    "compiler-rt",
    "libcxx",
    "libcxxabi",
    "openmp",
    "clang",
    "clang-tools-extra",
    "lld",
];

pub const VERSION_FILE: &str = "AndroidVersion.txt";

#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// Release name; the package is called `clang-<build_name>`
    pub build_name: String,
    /// Host the package runs on
    pub host: Host,
    /// Strip shipped binaries with the runtime toolchain's `llvm-strip`
    pub strip: bool,
    /// Write a `.tar.gz` into the dist directory
    pub create_tar: bool,
    /// Ship the lldb binaries
    pub build_lldb: bool,
    /// Upstream revision recorded in the version file
    pub revision: String,
}

impl PackageOptions {
    pub fn package_name(&self) -> String {
        format!("clang-{}", self.build_name)
    }
}

/// What `package_toolchain` produced.
#[derive(Debug)]
pub struct PackageResult {
    /// The pruned install tree
    pub install_dir: PathBuf,
    /// The archive, when one was requested
    pub archive: Option<PathBuf>,
    pub version: ClangVersion,
}

/// Binary file names that ship for `host`, with host suffixes applied.
pub fn shipped_binaries(host: Host, major_version: &str, build_lldb: bool) -> BTreeSet<String> {
    let versioned = format!("clang-{}", major_version);
    let mut names: Vec<&str> = SHIPPED_BINARIES.to_vec();
    if !host.is_windows() {
        names.push(&versioned);
    } else {
        names.retain(|n| !WINDOWS_EXCLUDED.contains(n));
    }
    if build_lldb {
        names.extend_from_slice(LLDB_BINARIES);
    }

    let mut shipped: BTreeSet<String> = names
        .into_iter()
        .map(|n| {
            if SCRIPTS.contains(&n) {
                n.to_string()
            } else {
                format!("{}{}", n, host.exe_suffix())
            }
        })
        .collect();
    if host.is_windows() && build_lldb {
        shipped.insert("liblldb.dll".to_string());
    }
    shipped
}

/// Static and shared libraries in `lib64` that ship for `host`.
pub fn shipped_libraries(host: Host) -> BTreeSet<String> {
    let mut libs: BTreeSet<String> = SHIPPED_LIBRARIES.iter().map(|s| s.to_string()).collect();
    if host.is_windows() {
        libs.extend(WINDOWS_LIBRARIES.iter().map(|s| s.to_string()));
    }
    libs
}

/// Package the install tree at `build_dir`.
pub fn package_toolchain(
    ctx: &BuildContext,
    build_dir: &Path,
    opts: &PackageOptions,
) -> Result<PackageResult> {
    let version = ClangVersion::from_install(build_dir)?;
    let package_name = opts.package_name();
    let install_dir = ctx.paths.package_install_dir(opts.host, &package_name);
    tracing::info!(
        "Packaging {} {} from {}",
        package_name,
        version,
        build_dir.display()
    );

    remove_dir_all_if_exists(&install_dir)?;
    copy_dir_all(build_dir, &install_dir)?;

    let bin_dir = install_dir.join("bin");
    let binaries = shipped_binaries(opts.host, &version.major_version(), opts.build_lldb);
    prune_binaries(ctx, &bin_dir, &binaries, opts.strip)?;
    verify_present(&bin_dir, &binaries)?;

    let lib_dir = install_dir.join("lib64");
    let libraries = shipped_libraries(opts.host);
    if opts.host.is_windows() {
        let winpthread = ctx
            .paths
            .gcc_root(Host::Windows)
            .join("x86_64-w64-mingw32/bin/libwinpthread-1.dll");
        install_into(&winpthread, &lib_dir)?;
    }
    remove_static_libraries(&lib_dir, &libraries)?;
    verify_present(&lib_dir, &libraries)?;

    install_stdatomic(ctx, &install_dir, &version)?;
    install_licenses(ctx, &install_dir)?;
    write_string(
        &install_dir.join(VERSION_FILE),
        &format!("{}\nbased on {}\n", version.long_version(), opts.revision),
    )?;

    let archive = if opts.create_tar {
        let tarball = ctx
            .paths
            .dist_dir
            .join(format!("{}-{}.tar.gz", package_name, opts.host.os_tag()));
        create_archive(&install_dir, &package_name, &tarball)?;
        Some(tarball)
    } else {
        None
    };

    Ok(PackageResult {
        install_dir,
        archive,
        version,
    })
}

/// Remove everything in `bin_dir` that does not ship and strip what does.
fn prune_binaries(
    ctx: &BuildContext,
    bin_dir: &Path,
    shipped: &BTreeSet<String>,
    strip: bool,
) -> Result<()> {
    let strip_tool = ctx.toolchains.runtime().strip();
    let entries = std::fs::read_dir(bin_dir)
        .with_context(|| format!("failed to read {}", bin_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;

        if !shipped.contains(&name) {
            tracing::debug!("pruning {}", path.display());
            if file_type.is_dir() {
                remove_dir_all_if_exists(&path)?;
            } else {
                remove_file_if_exists(&path)?;
            }
            continue;
        }

        if strip && file_type.is_file() && !is_script(&path)? {
            let cmd = ProcessBuilder::new(&strip_tool)
                .arg(&path)
                .env_clear()
                .envs(&ctx.base_env);
            ctx.runner
                .run(&cmd)
                .with_context(|| format!("failed to strip {}", path.display()))?;
        }
    }
    Ok(())
}

/// Remove static libraries directly under `lib_dir` that do not ship.
fn remove_static_libraries(lib_dir: &Path, shipped: &BTreeSet<String>) -> Result<()> {
    for lib in glob_files(lib_dir, &["*.a"])? {
        let keep = lib
            .file_name()
            .is_some_and(|n| shipped.contains(&*n.to_string_lossy()));
        if !keep {
            tracing::debug!("removing {}", lib.display());
            remove_file_if_exists(&lib)?;
        }
    }
    Ok(())
}

fn verify_present(dir: &Path, names: &BTreeSet<String>) -> Result<()> {
    for name in names {
        let path = dir.join(name);
        if path.symlink_metadata().is_err() {
            return Err(BuildError::MissingArtifact { path }.into());
        }
    }
    Ok(())
}

/// Ship bionic's `stdatomic.h` in the compiler's include directory.
fn install_stdatomic(ctx: &BuildContext, install_dir: &Path, version: &ClangVersion) -> Result<()> {
    let bionic = ctx.paths.android_path("bionic/libc/include");
    let include = install_dir
        .join("lib64/clang")
        .join(version.long_version())
        .join("include");
    install_into(&bionic.join("stdatomic.h"), &include)?;
    install_into(&bionic.join("bits/stdatomic.h"), &include.join("bits"))
}

fn install_licenses(ctx: &BuildContext, install_dir: &Path) -> Result<()> {
    let llvm_android = ctx.paths.android_path("toolchain/llvm_android");
    for module_license in glob_files(&llvm_android, &["MODULE_LICENSE_*"])? {
        install_into(&module_license, install_dir)?;
    }

    let mut notices = Vec::new();
    for project in LICENSED_PROJECTS {
        for license in glob_files(&ctx.paths.llvm_path(project), &["LICENSE.*"])? {
            notices.push(read_to_string(&license)?);
        }
    }
    if notices.is_empty() {
        anyhow::bail!(
            "no license files found under {}",
            ctx.paths.llvm_src.display()
        );
    }
    write_string(&install_dir.join("NOTICE"), &notices.join("\n"))
}

/// Write `dir` as `<top>/...` into a gzip-compressed tarball.
fn create_archive(dir: &Path, top: &str, tarball: &Path) -> Result<()> {
    if let Some(parent) = tarball.parent() {
        ensure_dir(parent)?;
    }
    tracing::info!("Creating {}", tarball.display());
    let file = File::create(tarball)
        .with_context(|| format!("failed to create {}", tarball.display()))?;

    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    archive.follow_symlinks(false);
    archive
        .append_dir_all(top, dir)
        .with_context(|| format!("failed to archive {}", dir.display()))?;
    archive.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_package_tree, MockRunner, TestEnv};
    use flate2::read::GzDecoder;

    fn options(host: Host) -> PackageOptions {
        PackageOptions {
            build_name: "r1".to_string(),
            host,
            strip: true,
            create_tar: true,
            build_lldb: true,
            revision: "r383902".to_string(),
        }
    }

    #[test]
    fn test_shipped_binaries_per_host() {
        let linux = shipped_binaries(Host::Linux, "12", true);
        assert!(linux.contains("clang-12"));
        assert!(linux.contains("scan-build"));
        assert!(linux.contains("lldb"));

        let windows = shipped_binaries(Host::Windows, "12", true);
        assert!(windows.contains("clang.exe"));
        assert!(windows.contains("git-clang-format"));
        assert!(windows.contains("liblldb.dll"));
        assert!(!windows.contains("clang-12.exe"));
        assert!(!windows.contains("scan-build"));

        let no_lldb = shipped_binaries(Host::Darwin, "12", false);
        assert!(!no_lldb.contains("lldb"));
        assert!(!no_lldb.contains("lldb-argdumper"));
    }

    #[test]
    fn test_package_prunes_and_stamps() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Linux, (12, 0, 1));
        std::fs::write(build_dir.join("bin/llvm-tblgen"), "ELF").unwrap();
        std::fs::write(build_dir.join("lib64/libLLVMSupport.a"), "!<arch>").unwrap();

        let result = package_toolchain(&env.ctx, &build_dir, &options(Host::Linux)).unwrap();
        let install = &result.install_dir;
        assert!(install.ends_with("install/linux-x86/clang-r1"));

        let bins: BTreeSet<String> = std::fs::read_dir(install.join("bin"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(bins, shipped_binaries(Host::Linux, "12", true));
        assert!(!install.join("lib64/libLLVMSupport.a").exists());
        assert!(install.join("lib64/libc++abi.a").is_file());

        assert_eq!(
            std::fs::read_to_string(install.join(VERSION_FILE)).unwrap(),
            "12.0.1\nbased on r383902\n"
        );
        let notice = std::fs::read_to_string(install.join("NOTICE")).unwrap();
        assert!(notice.starts_with("llvm license\n"));
        assert!(notice.contains("lld license"));
        assert!(install.join("MODULE_LICENSE_BSD_LIKE").is_file());
        assert!(install
            .join("lib64/clang/12.0.1/include/bits/stdatomic.h")
            .is_file());

        // The build tree itself is left alone.
        assert!(build_dir.join("bin/llvm-tblgen").exists());
    }

    #[test]
    fn test_strip_skips_scripts() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Linux, (12, 0, 1));
        package_toolchain(&env.ctx, &build_dir, &options(Host::Linux)).unwrap();

        let stripped: Vec<_> = env
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.program == "llvm-strip")
            .collect();
        assert!(!stripped.is_empty());
        assert!(stripped.iter().all(|c| c.env_clear));
        assert!(stripped.iter().any(|c| c.args[0].ends_with("bin/clang")));
        assert!(!stripped.iter().any(|c| c.args[0].ends_with("scan-build")));
    }

    #[test]
    fn test_no_strip_runs_nothing() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Linux, (12, 0, 1));
        let opts = PackageOptions {
            strip: false,
            create_tar: false,
            ..options(Host::Linux)
        };
        let result = package_toolchain(&env.ctx, &build_dir, &opts).unwrap();
        assert!(result.archive.is_none());
        assert!(env.runner.calls().is_empty());
    }

    #[test]
    fn test_missing_binary_fails_before_archive() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Linux, (12, 0, 1));
        std::fs::remove_file(build_dir.join("bin/lld")).unwrap();

        let err = package_toolchain(&env.ctx, &build_dir, &options(Host::Linux)).unwrap_err();
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::MissingArtifact { path }) => assert!(path.ends_with("bin/lld")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!env.paths.dist_dir.join("clang-r1-linux-x86.tar.gz").exists());
    }

    #[test]
    fn test_missing_library_fails() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Linux, (12, 0, 1));
        std::fs::remove_file(build_dir.join("lib64/libc++.a")).unwrap();

        let err = package_toolchain(&env.ctx, &build_dir, &options(Host::Linux)).unwrap_err();
        assert!(err.to_string().contains("libc++.a"));
    }

    #[test]
    fn test_archive_contents() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Linux, (12, 0, 1));
        let result = package_toolchain(&env.ctx, &build_dir, &options(Host::Linux)).unwrap();

        let tarball = result.archive.unwrap();
        assert_eq!(tarball, env.paths.dist_dir.join("clang-r1-linux-x86.tar.gz"));

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&tarball).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n == "clang-r1/bin/clang"));
        assert!(names.iter().any(|n| n == "clang-r1/AndroidVersion.txt"));
        assert!(names.iter().all(|n| n.starts_with("clang-r1")));
    }

    #[test]
    fn test_windows_package_copies_winpthreads() {
        let env = TestEnv::new(MockRunner::new());
        let build_dir = fake_package_tree(&env.paths, Host::Windows, (12, 0, 1));
        let opts = PackageOptions {
            create_tar: false,
            ..options(Host::Windows)
        };
        let result = package_toolchain(&env.ctx, &build_dir, &opts).unwrap();
        assert!(result.install_dir.ends_with("install/windows-x86/clang-r1"));
        assert!(result.install_dir.join("lib64/libwinpthread-1.dll").is_file());
        assert!(result.install_dir.join("bin/clang.exe").is_file());
        assert!(!result.install_dir.join("bin/scan-build").exists());
    }
}
