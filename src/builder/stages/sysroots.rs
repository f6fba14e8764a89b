//! Assembles the platform and NDK device sysroots from the prebuilt NDK.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::builder::context::BuildContext;
use crate::builder::registry::BuildState;
use crate::builder::toolchain::ToolchainHandle;
use crate::builder::Builder;
use crate::core::host::Arch;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;
use crate::util::fs::{copy_dir_all, ensure_dir, remove_dir_all_if_exists, write_string};
use crate::util::process::ProcessBuilder;

use super::runtimes::{android_configs, sysroot_lib_dir};
use super::SYSROOTS;

/// Removed from every sysroot; the toolchain ships its own.
const PRUNED_EVERYWHERE: &[&str] = &["libunwind.a", "libcompiler_rt-extras.a"];

/// The NDK's C++ STL, removed from platform sysroots.
const PRUNED_FROM_PLATFORM: &[&str] = &[
    "libandroid_support.a",
    "libc++abi.a",
    "libc++.so",
    "libc++.a",
    "libc++_shared.so",
    "libc++_static.a",
];

/// Symbols compiler-rt needs from the platform libc++.
const LIBCXX_STUB: &str = "\
void __cxa_atexit() {}
void __cxa_demangle() {}
void __cxa_finalize() {}
void __dynamic_cast() {}
void _ZTIN10__cxxabiv117__class_type_infoE() {}
void _ZTIN10__cxxabiv120__si_class_type_infoE() {}
void _ZTIN10__cxxabiv121__vmi_class_type_infoE() {}
void _ZTISt9type_info() {}
";

pub struct SysrootsBuilder {
    config_list: Vec<ConfigEntry>,
    src_dir: PathBuf,
}

impl SysrootsBuilder {
    pub fn new(paths: &Paths) -> Result<Self> {
        Ok(SysrootsBuilder {
            config_list: android_configs()?,
            src_dir: paths
                .ndk_base()
                .join("toolchains/llvm/prebuilt/linux-x86_64/sysroot"),
        })
    }

    fn command(ctx: &BuildContext, program: &Path) -> ProcessBuilder {
        ProcessBuilder::new(program).env_clear().envs(&ctx.base_env)
    }

    /// Replace `libc.a` members the NDK r20 gets wrong for arm and x86.
    ///
    /// arm: libunwind wants `dl_unwind_find_exidx`. x86: libc.a wants
    /// `__x86.get_pc_thunk.cx` from libgcc.
    fn patch_ndk_libc(
        ctx: &BuildContext,
        toolchain: &ToolchainHandle,
        arch: Arch,
        sysroot: &Path,
    ) -> Result<()> {
        let (src, name) = match arch {
            Arch::Arm => (
                "bionic/libc/arch-arm/bionic/exidx_static.c",
                "exidx_static",
            ),
            Arch::I386 => (
                "bionic/libc/arch-x86/bionic/__x86.get_pc_thunk.S",
                "__x86.get_pc_thunk",
            ),
            _ => return Ok(()),
        };
        let patch_dir = ctx.paths.out_path("ndk_libc_patch");
        ensure_dir(&patch_dir)?;
        let obj = patch_dir.join(format!("{}.o", name));
        let libc = sysroot
            .join("usr/lib")
            .join(arch.ndk_triple())
            .join("29/libc.a");

        let compile = Self::command(ctx, &toolchain.cc())
            .arg(format!("--sysroot={}", sysroot.display()))
            .arg("-c")
            .arg(format!("--target={}", arch.llvm_triple()))
            .arg(format!("-o{}", obj.display()))
            .arg(ctx.paths.android_path(src));
        ctx.runner
            .run(&compile)
            .with_context(|| format!("failed to compile {}", src))?;

        let archive = Self::command(ctx, &toolchain.ar())
            .arg("rcs")
            .arg(&libc)
            .arg(&obj);
        ctx.runner
            .run(&archive)
            .with_context(|| format!("failed to patch {}", libc.display()))
    }

    /// Drop the STL headers and link a stub `libc++.so` in its place.
    fn stub_platform_libcxx(
        ctx: &BuildContext,
        toolchain: &ToolchainHandle,
        arch: Arch,
        sysroot: &Path,
    ) -> Result<()> {
        remove_dir_all_if_exists(&sysroot.join("usr/include/c++"))?;
        remove_dir_all_if_exists(&sysroot.join("usr/local"))?;

        let stubs = ctx.paths.out_path("platform_stubs").join(arch.ndk_arch());
        let stub_src = stubs.join("libc++.c");
        write_string(&stub_src, LIBCXX_STUB)?;
        let lib_dir = sysroot_lib_dir(sysroot, arch);
        ensure_dir(&lib_dir)?;

        let link = Self::command(ctx, &toolchain.cc())
            .arg(format!("--target={}", arch.llvm_triple()))
            .args(["-fuse-ld=lld", "-nostdlib", "-shared", "-Wl,-soname,libc++.so"])
            .arg(format!("-o{}", lib_dir.join("libc++.so").display()))
            .arg(&stub_src);
        ctx.runner
            .run(&link)
            .context("failed to link the platform libc++ stub")?;

        // 64-bit targets get a real libc++abi.a from platform-libcxxabi.
        if arch.is_32_bit() {
            write_string(&lib_dir.join("libc++abi.so"), "INPUT(-lc++)")?;
        }
        Ok(())
    }
}

/// Delete files whose names appear in `names`; returns how many went.
fn prune_files(root: &Path, names: &[&str]) -> Result<usize> {
    let mut doomed = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if names.iter().any(|n| entry.file_name() == *n) {
            doomed.push(entry.into_path());
        }
    }
    for path in &doomed {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(doomed.len())
}

impl Builder for SysrootsBuilder {
    fn name(&self) -> &str {
        SYSROOTS
    }

    fn config_list(&self) -> &[ConfigEntry] {
        &self.config_list
    }

    fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    fn install_dir(&self, ctx: &BuildContext, entry: &ConfigEntry) -> Result<PathBuf> {
        entry
            .sysroot(&ctx.paths)
            .with_context(|| format!("{} has no device sysroot", entry))
    }

    fn build_entry(&self, ctx: &mut BuildContext, entry: &ConfigEntry) -> Result<()> {
        let toolchain = ctx.toolchains.runtime();
        let arch = entry.target_arch();
        let platform = entry.is_platform();
        let sysroot = self.install_dir(ctx, entry)?;

        tracing::info!("Assembling sysroot {}", sysroot.display());
        remove_dir_all_if_exists(&sysroot)?;
        copy_dir_all(&self.src_dir, &sysroot)?;

        let mut pruned = prune_files(&sysroot, PRUNED_EVERYWHERE)?;
        if platform {
            pruned += prune_files(&sysroot, PRUNED_FROM_PLATFORM)?;
        }
        tracing::debug!("pruned {} files from {}", pruned, sysroot.display());

        ctx.builders.transition(SYSROOTS, BuildState::Compiling)?;
        if platform {
            Self::stub_platform_libcxx(ctx, &toolchain, arch, &sysroot)?;
        } else {
            Self::patch_ndk_libc(ctx, &toolchain, arch, &sysroot)?;
        }
        ctx.builders.transition(SYSROOTS, BuildState::Installing)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::SysrootKind;
    use crate::test_support::{MockRunner, TestEnv};
    use std::sync::Arc;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    fn fake_ndk(env: &TestEnv) -> PathBuf {
        let sysroot = env
            .paths
            .ndk_base()
            .join("toolchains/llvm/prebuilt/linux-x86_64/sysroot");
        for file in [
            "usr/include/stdio.h",
            "usr/include/c++/v1/vector",
            "usr/local/include/extra.h",
            "usr/lib/arm-linux-androideabi/libunwind.a",
            "usr/lib/arm-linux-androideabi/libc++_shared.so",
            "usr/lib/arm-linux-androideabi/29/libc.a",
            "usr/lib/aarch64-linux-android/libcompiler_rt-extras.a",
            "usr/lib/aarch64-linux-android/libc++abi.a",
        ] {
            touch(&sysroot.join(file));
        }
        sysroot
    }

    fn build(env: &mut TestEnv) {
        let builder = Arc::new(SysrootsBuilder::new(&env.paths).unwrap());
        env.ctx.builders.register(builder.clone()).unwrap();
        builder.build(&mut env.ctx).unwrap();
    }

    #[test]
    fn test_ndk_sysroot_keeps_stl() {
        let mut env = TestEnv::new(MockRunner::new());
        fake_ndk(&env);
        build(&mut env);

        let ndk = env.paths.device_sysroot(SysrootKind::Ndk, Arch::Arm);
        assert!(ndk.join("usr/include/c++/v1/vector").is_file());
        assert!(ndk
            .join("usr/lib/arm-linux-androideabi/libc++_shared.so")
            .is_file());
        assert!(!ndk.join("usr/lib/arm-linux-androideabi/libunwind.a").exists());
        assert!(!ndk
            .join("usr/lib/aarch64-linux-android/libcompiler_rt-extras.a")
            .exists());
    }

    #[test]
    fn test_platform_sysroot_drops_stl_and_gets_stub() {
        let mut env = TestEnv::new(MockRunner::new());
        fake_ndk(&env);
        build(&mut env);

        let arm = env.paths.device_sysroot(SysrootKind::Platform, Arch::Arm);
        assert!(arm.join("usr/include/stdio.h").is_file());
        assert!(!arm.join("usr/include/c++").exists());
        assert!(!arm.join("usr/local").exists());
        assert!(!arm
            .join("usr/lib/aarch64-linux-android/libc++abi.a")
            .exists());
        assert_eq!(
            std::fs::read_to_string(arm.join("usr/lib/libc++abi.so")).unwrap(),
            "INPUT(-lc++)"
        );

        let x86_64 = env.paths.device_sysroot(SysrootKind::Platform, Arch::X86_64);
        assert!(!x86_64.join("usr/lib64/libc++abi.so").exists());

        let stub = env.paths.out_path("platform_stubs/arm64/libc++.c");
        assert!(std::fs::read_to_string(stub)
            .unwrap()
            .contains("_ZTISt9type_info"));

        let links: Vec<_> = env
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.args.iter().any(|a| a == "-Wl,-soname,libc++.so"))
            .collect();
        assert_eq!(links.len(), 4);
        assert!(links[3].args.contains(&format!(
            "-o{}",
            x86_64.join("usr/lib64/libc++.so").display()
        )));
    }

    #[test]
    fn test_ndk_libc_patched_for_arm_and_x86_only() {
        let mut env = TestEnv::new(MockRunner::new());
        fake_ndk(&env);
        build(&mut env);

        let archives: Vec<_> = env
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.program == "llvm-ar")
            .collect();
        assert_eq!(archives.len(), 2);
        assert!(archives[0].args[1].ends_with("arm/usr/lib/arm-linux-androideabi/29/libc.a"));
        assert!(archives[0].args[2].ends_with("ndk_libc_patch/exidx_static.o"));
        assert!(archives[1].args[2].ends_with("ndk_libc_patch/__x86.get_pc_thunk.o"));
    }

    #[test]
    fn test_missing_ndk_fails() {
        let mut env = TestEnv::new(MockRunner::new());
        let builder = Arc::new(SysrootsBuilder::new(&env.paths).unwrap());
        env.ctx.builders.register(builder.clone()).unwrap();
        assert!(builder.build(&mut env.ctx).is_err());
    }
}
