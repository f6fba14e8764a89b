//! Device and host runtime libraries, built with the current runtime
//! toolchain and deposited into its resource tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::cmake::{entry_hook, finish_hook, CMakeBuilder, InstallLocation};
use crate::builder::layers::{layer, RuntimeLayer};
use crate::core::host::{Arch, Host};
use crate::core::matrix::{
    concat, device_configs, ConfigEntry, ConfigMatrix, MatrixError, SysrootKind, TargetPlatform,
    Variant,
};
use crate::core::paths::Paths;
use crate::util::fs::{
    copy_dir_all, ensure_dir, remove_dir_all_if_exists, remove_file_if_exists, symlink,
};

use super::{
    install_artifact, install_into, BUILTINS, COMPILER_RT, COMPILER_RT_I386_HOST, LIBOMP,
    LIBUNWIND, LLDB_SERVER, PLATFORM_LIBCXXABI,
};

/// Every device architecture, platform sysroot first.
pub fn android_configs() -> Result<Vec<ConfigEntry>, MatrixError> {
    ConfigMatrix::new()
        .archs(Arch::DEVICE)
        .platform(TargetPlatform::Device(SysrootKind::Platform))
        .platform(TargetPlatform::Device(SysrootKind::Ndk))
        .expand()
}

fn runtime_builder(
    name: &str,
    src_dir: PathBuf,
    config_list: Vec<ConfigEntry>,
    runtime: RuntimeLayer,
) -> CMakeBuilder {
    CMakeBuilder::new(name, src_dir, config_list).layer(runtime)
}

fn compiler_rt_lib(kind: &str, arch: Arch) -> String {
    format!("libclang_rt.{}-{}-android.a", kind, arch.llvm_arch())
}

/// Builtins for the NDK only; clang finds them by absolute path in its
/// resource dir, so one copy serves every later device build.
pub fn builtins(paths: &Paths) -> Result<CMakeBuilder> {
    let configs = device_configs(SysrootKind::Ndk, Variant::Default)?;
    Ok(runtime_builder(
        BUILTINS,
        paths.llvm_path("compiler-rt/lib/builtins"),
        configs,
        RuntimeLayer::default(),
    )
    .boxed_layer(layer(|cx, cfg| {
        // Nothing can link yet; the builtins are what's missing.
        cfg.define("CMAKE_C_COMPILER_WORKS", "ON")
            .define("CMAKE_ASM_COMPILER_WORKS", "ON")
            .define("COMPILER_RT_DEFAULT_TARGET_TRIPLE", cx.entry.target_arch().llvm_triple())
            // Android would install to lib/android instead of lib/linux.
            .undefine("CMAKE_SYSTEM_NAME");
        Ok(())
    }))
    .no_install()
    .after_install(entry_hook(|cx| {
        let file = compiler_rt_lib("builtins", cx.entry.target_arch());
        let src = cx.output_dir.join("lib/linux").join(&file);
        install_artifact(&src, &cx.toolchain.resource_dir()?.join(&file))?;
        install_artifact(&src, &cx.toolchain.ndk_runtimes_dir().join(&file))
    })))
}

fn libunwind_tag(entry: &ConfigEntry) -> &'static str {
    if entry.is_platform() {
        "-exported"
    } else {
        "-hermetic"
    }
}

/// Platform builds export the unwinder; NDK builds keep it hermetic.
pub fn libunwind(paths: &Paths) -> Result<CMakeBuilder> {
    Ok(runtime_builder(
        LIBUNWIND,
        paths.llvm_path("libunwind"),
        android_configs()?,
        RuntimeLayer::default(),
    )
    .output_tag(libunwind_tag)
    .boxed_layer(layer(|cx, cfg| {
        let exported = cx.entry.is_platform();
        cfg.cflags.push("-D_LIBUNWIND_USE_DLADDR=0".into());
        cfg.ldflags.push("-unwindlib=none".into());
        cfg.define("CMAKE_POSITION_INDEPENDENT_CODE", "ON")
            .define(
                "LIBUNWIND_HERMETIC_STATIC_LIBRARY",
                if exported { "FALSE" } else { "TRUE" },
            )
            .define("LIBUNWIND_ENABLE_SHARED", "FALSE");
        Ok(())
    }))
    .no_install()
    .after_install(entry_hook(|cx| {
        let arch = cx.entry.target_arch();
        let src = cx.output_dir.join("lib64/libunwind.a");
        let res_dir = cx.toolchain.resource_dir()?.join(arch.as_str());
        if cx.entry.is_platform() {
            return install_artifact(&src, &res_dir.join("libunwind-exported.a"));
        }
        install_artifact(&src, &res_dir.join("libunwind.a"))?;
        install_artifact(
            &src,
            &cx.toolchain
                .ndk_runtimes_dir()
                .join(arch.as_str())
                .join("libunwind.a"),
        )
    })))
}

/// A static libc++abi in the 64-bit platform sysroots, for the sanitizers.
pub fn platform_libcxxabi(paths: &Paths) -> Result<CMakeBuilder> {
    let configs = ConfigMatrix::new()
        .archs([Arch::Aarch64, Arch::X86_64])
        .platform(TargetPlatform::Device(SysrootKind::Platform))
        .expand()?;
    let libcxx_includes = paths.llvm_path("libcxx/include");
    Ok(runtime_builder(
        PLATFORM_LIBCXXABI,
        paths.llvm_path("libcxxabi"),
        configs,
        // Built against the in-tree libc++ headers.
        RuntimeLayer {
            suppress_libcxx_headers: true,
        },
    )
    .boxed_layer(layer(move |_cx, cfg| {
        cfg.define_path("LIBCXXABI_LIBCXX_INCLUDES", &libcxx_includes)
            .define("LIBCXXABI_ENABLE_SHARED", "OFF");
        Ok(())
    }))
    .no_install()
    .after_install(entry_hook(|cx| {
        let sysroot = cx
            .sysroot()
            .with_context(|| format!("{} has no sysroot", cx.entry))?;
        let lib = sysroot_lib_dir(&sysroot, cx.entry.target_arch());
        install_artifact(&cx.output_dir.join("lib64/libc++abi.a"), &lib.join("libc++abi.a"))
    })))
}

/// `usr/lib64` for x86_64 sysroots, `usr/lib` otherwise.
pub fn sysroot_lib_dir(sysroot: &Path, arch: Arch) -> PathBuf {
    let lib = if arch == Arch::X86_64 { "lib64" } else { "lib" };
    sysroot.join("usr").join(lib)
}

/// Sanitizers, profile and fuzzer runtimes for every device configuration.
pub fn compiler_rt(paths: &Paths) -> Result<CMakeBuilder> {
    let header_src = paths.llvm_path("compiler-rt/lib/fuzzer");
    Ok(runtime_builder(
        COMPILER_RT,
        paths.llvm_path("compiler-rt"),
        android_configs()?,
        RuntimeLayer::default(),
    )
    .install_to(InstallLocation::per_entry(|ctx, entry, toolchain| {
        if entry.is_platform() {
            return Ok(toolchain.clang_lib_dir()?);
        }
        // NDK runtimes are copied into runtimes_ndk_cxx by hand.
        Ok(ctx
            .paths
            .out_path(format!("{}{}-install", COMPILER_RT, entry.output_suffix())))
    }))
    .boxed_layer(layer(|cx, cfg| {
        let entry = cx.entry;
        cfg.cflags.push("-funwind-tables".into());
        let test_cflags = cfg.c_flags();

        let mut libs = Vec::new();
        if entry.target_arch() == Arch::Arm {
            libs.push("-latomic");
        }
        if entry.api_level().unwrap_or_default() < 21 {
            libs.push("-landroid_support");
        }

        cfg.define("COMPILER_RT_BUILD_BUILTINS", "OFF")
            .define("COMPILER_RT_USE_BUILTINS_LIBRARY", "ON")
            .define("COMPILER_RT_TEST_COMPILER_CFLAGS", test_cflags)
            .define("COMPILER_RT_DEFAULT_TARGET_TRIPLE", entry.target_arch().llvm_triple())
            .define("COMPILER_RT_INCLUDE_TESTS", "OFF")
            .define("SANITIZER_CXX_ABI", "libcxxabi")
            .define("SANITIZER_COMMON_LINK_LIBS", libs.join(" "))
            .undefine("CMAKE_SYSTEM_NAME");
        if entry.is_platform() {
            cfg.define("COMPILER_RT_HWASAN_WITH_INTERCEPTORS", "OFF");
        }
        Ok(())
    }))
    .after_install(entry_hook(|cx| {
        let arch = cx.entry.target_arch();
        let lib_dir = cx.install_dir.join("lib/linux");
        // Old location of the fuzzer library, still used by some builds.
        install_artifact(
            &lib_dir.join(compiler_rt_lib("fuzzer", arch)),
            &lib_dir.join(arch.as_str()).join("libFuzzer.a"),
        )?;
        if !cx.entry.is_platform() {
            copy_dir_all(&lib_dir, &cx.toolchain.ndk_runtimes_dir())?;
        }
        Ok(())
    }))
    .on_finish(finish_hook(move |_ctx, toolchain| {
        let header_dst = toolchain.path().join("prebuilt_include/llvm/lib/Fuzzer");
        install_fuzzer_headers(&header_src, &header_dst)?;

        let resource_dir = toolchain.resource_dir()?;
        ensure_dir(&resource_dir)?;
        let link = resource_dir.join("libclang_rt.hwasan_static-aarch64-android.a");
        remove_file_if_exists(&link)?;
        symlink(Path::new("libclang_rt.hwasan-aarch64-android.a"), &link)
            .with_context(|| format!("failed to create symlink: {}", link.display()))?;
        Ok(())
    })))
}

fn install_fuzzer_headers(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    let entries =
        std::fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read {}", src.display()))?
            .path();
        if matches!(path.extension().and_then(|e| e.to_str()), Some("h" | "def")) {
            install_into(&path, dst)?;
        }
    }
    Ok(())
}

/// 32-bit host sanitizers for Linux.
pub fn compiler_rt_i386_host(paths: &Paths) -> Result<CMakeBuilder> {
    let entry = ConfigEntry::new(Arch::I386, TargetPlatform::Native(Host::Linux), Variant::Default)?;
    Ok(runtime_builder(
        COMPILER_RT_I386_HOST,
        paths.llvm_path("compiler-rt"),
        vec![entry],
        RuntimeLayer::default(),
    )
    .remove_cmake_cache()
    .before_entry(entry_hook(|cx| {
        // Forces the libc++ bundled with libFuzzer to reconfigure too.
        remove_dir_all_if_exists(&cx.output_dir.join("lib/fuzzer/libcxx_fuzzer_i386-stamps"))
    }))
    .boxed_layer(layer(|_cx, cfg| {
        cfg.cflags.extend([
            "-D__STDC_FORMAT_MACROS".to_string(),
            "--target=i386-linux-gnu".to_string(),
            "-march=i686".to_string(),
        ]);
        cfg.define("CMAKE_C_COMPILER_TARGET", "i386-linux-gnu")
            .define("COMPILER_RT_INCLUDE_TESTS", "ON")
            .define("COMPILER_RT_ENABLE_WERROR", "ON")
            .define("SANITIZER_CXX_ABI", "libstdc++");
        Ok(())
    })))
}

/// OpenMP: static for both sysroots, plus a shared NDK build.
pub fn libomp(paths: &Paths) -> Result<CMakeBuilder> {
    let configs = concat([
        device_configs(SysrootKind::Platform, Variant::Static)?,
        device_configs(SysrootKind::Ndk, Variant::Static)?,
        device_configs(SysrootKind::Ndk, Variant::Shared)?,
    ])?;
    Ok(runtime_builder(
        LIBOMP,
        paths.llvm_path("openmp"),
        configs,
        RuntimeLayer::default(),
    )
    .install_to(InstallLocation::per_entry(|_ctx, entry, toolchain| {
        let arch = entry.target_arch().as_str();
        if entry.is_platform() {
            Ok(toolchain.clang_lib_dir()?.join("lib/linux").join(arch))
        } else {
            Ok(toolchain.ndk_runtimes_dir().join(arch))
        }
    }))
    .boxed_layer(layer(|cx, cfg| {
        let shared = cx.entry.variant().is_shared();
        cfg.define("CMAKE_POSITION_INDEPENDENT_CODE", "ON")
            .define("OPENMP_ENABLE_LIBOMPTARGET", "FALSE")
            .define("OPENMP_ENABLE_OMPT_TOOLS", "FALSE")
            .define("LIBOMP_ENABLE_SHARED", if shared { "TRUE" } else { "FALSE" })
            .define("LIBOMP_LIBFLAGS", "-lm")
            .define("CMAKE_POLICY_DEFAULT_CMP0056", "NEW");
        Ok(())
    }))
    .no_install()
    .after_install(entry_hook(|cx| {
        let lib = if cx.entry.variant().is_shared() {
            "libomp.so"
        } else {
            "libomp.a"
        };
        install_artifact(
            &cx.output_dir.join("runtime/src").join(lib),
            &cx.install_dir.join(lib),
        )
    })))
}

/// A statically linked lldb-server per device architecture.
pub fn lldb_server(paths: &Paths) -> Result<CMakeBuilder> {
    Ok(runtime_builder(
        LLDB_SERVER,
        paths.llvm_path("llvm"),
        device_configs(SysrootKind::Ndk, Variant::Static)?,
        RuntimeLayer::default(),
    )
    .ninja_target("lldb-server")
    .install_to(InstallLocation::per_entry(|_ctx, entry, toolchain| {
        Ok(toolchain
            .ndk_runtimes_dir()
            .join(entry.target_arch().as_str()))
    }))
    .boxed_layer(layer(|cx, cfg| {
        let tc = cx.toolchain;
        // -stdlib=libc++ is added by the build and unused with -nostdinc++.
        cfg.cflags.push("-Wno-unused-command-line-argument".into());
        cfg.ldflags.push("-static".into());
        cfg.define("LLVM_ENABLE_PROJECTS", "clang;lldb")
            .define_path("LLVM_TABLEGEN", tc.build_tool("llvm-tblgen"))
            .define_path("CLANG_TABLEGEN", tc.build_tool("clang-tblgen"))
            .define_path("LLDB_TABLEGEN", tc.build_tool("lldb-tblgen"));
        Ok(())
    }))
    .no_install()
    .after_install(entry_hook(|cx| {
        install_into(&cx.output_dir.join("bin/lldb-server"), cx.install_dir)
    })))
}
