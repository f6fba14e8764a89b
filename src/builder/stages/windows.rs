//! The cross-compiled Windows toolchain and the libc++ it links against.

use crate::builder::cmake::{CMakeBuilder, InstallLocation, ToolchainSource};
use crate::builder::layers::{layer, LlvmLayer, RuntimeLayer, ANDROID_TARGETS};
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;

use super::{StageOptions, LIBCXX, LIBCXXABI, STAGE1, WINDOWS};

pub fn libcxxabi(paths: &Paths, opts: &StageOptions) -> CMakeBuilder {
    let libcxx_includes = paths.llvm_path("libcxx/include");
    let assertions = opts.enable_assertions;
    CMakeBuilder::new(LIBCXXABI, paths.llvm_path("libcxxabi"), vec![ConfigEntry::windows()])
        .install_to(InstallLocation::Fixed(paths.windows_install_dir()))
        .remove_install_dir()
        .layer(RuntimeLayer::default())
        .boxed_layer(layer(move |_cx, cfg| {
            // Built before libc++, straight from its headers.
            cfg.cflags.extend([
                "-D_LIBCPP_DISABLE_VISIBILITY_ANNOTATIONS".to_string(),
                "-D_LIBCPP_HAS_THREAD_API_WIN32".to_string(),
            ]);
            cfg.define("LIBCXXABI_ENABLE_NEW_DELETE_DEFINITIONS", "OFF")
                .define_path("LIBCXXABI_LIBCXX_INCLUDES", &libcxx_includes)
                .define("LIBCXXABI_ENABLE_SHARED", "OFF");
            if assertions {
                cfg.define("LIBCXXABI_ENABLE_ASSERTIONS", "ON");
            }
            Ok(())
        }))
}

pub fn libcxx(paths: &Paths, opts: &StageOptions) -> CMakeBuilder {
    let abi_includes = paths.llvm_path("libcxxabi/include");
    let assertions = opts.enable_assertions;
    CMakeBuilder::new(LIBCXX, paths.llvm_path("libcxx"), vec![ConfigEntry::windows()])
        .install_to(InstallLocation::Fixed(paths.windows_install_dir()))
        .layer(RuntimeLayer::default())
        .boxed_layer(layer(move |cx, cfg| {
            // Headers from source, library from the libcxxabi install.
            let abi_lib = cx.ctx.install_dir_of(LIBCXXABI)?.join("lib64");
            cfg.cflags
                .push("-D_LIBCXXABI_DISABLE_VISIBILITY_ANNOTATIONS".to_string());
            cfg.define("LIBCXX_ENABLE_STATIC_ABI_LIBRARY", "ON")
                .define("LIBCXX_CXX_ABI", "libcxxabi")
                .define("LIBCXX_HAS_WIN32_THREAD_API", "ON")
                .define_path("LIBCXX_CXX_ABI_INCLUDE_PATHS", &abi_includes)
                .define_path("LIBCXX_CXX_ABI_LIBRARY_PATH", abi_lib)
                .define("LIBCXX_ENABLE_SHARED", "OFF");
            if assertions {
                cfg.define("LIBCXX_ENABLE_ASSERTIONS", "ON");
            }
            Ok(())
        }))
}

/// Runs on the build host with stage1's table generators.
pub fn windows_toolchain(paths: &Paths, opts: &StageOptions) -> CMakeBuilder {
    let mut projects = vec!["clang", "clang-tools-extra", "lld"];
    if opts.build_lldb {
        projects.push("lldb");
    }
    let llvm = LlvmLayer {
        enable_assertions: opts.enable_assertions,
        clang_vendor: Some(opts.vendor()),
        patch_level: opts.patch_level.clone(),
        ..LlvmLayer::new(&projects, ANDROID_TARGETS)
    };

    let zlib = paths.win_zlib();
    let build_lldb = opts.build_lldb;
    CMakeBuilder::new(WINDOWS, paths.llvm_path("llvm"), vec![ConfigEntry::windows()])
        .toolchain(ToolchainSource::Builder(STAGE1.to_string()))
        .install_to(InstallLocation::Fixed(paths.windows_install_dir()))
        .layer(llvm)
        .boxed_layer(layer(move |cx, cfg| {
            let tc = cx.toolchain;
            let libcxx = cx.ctx.install_dir_of(LIBCXX)?;

            cfg.define("LLVM_BUILD_RUNTIME", "OFF")
                .define("LLVM_TOOL_CLANG_TOOLS_EXTRA_BUILD", "ON")
                .define("LLVM_TOOL_OPENMP_BUILD", "OFF")
                .define("LLVM_INCLUDE_TESTS", "OFF")
                .define_path("LLVM_CONFIG_PATH", tc.build_tool("llvm-config"))
                .define_path("LLVM_TABLEGEN", tc.build_tool("llvm-tblgen"))
                .define_path("CLANG_TABLEGEN", tc.build_tool("clang-tblgen"));
            if build_lldb {
                cfg.define_path("LLDB_TABLEGEN", tc.build_tool("lldb-tblgen"));
            }

            cfg.cflags.push("-DMS_WIN64".to_string());
            cfg.cflags
                .push(format!("-I{}", zlib.join("include").display()));
            // Static TLS destructors in clangd need it.
            cfg.cxxflags.push("-fuse-cxa-atexit".to_string());
            cfg.cxxflags
                .push(format!("-I{}", libcxx.join("include/c++/v1").display()));

            cfg.ldflags.extend([
                "-Wl,--dynamicbase".to_string(),
                "-Wl,--nxcompat".to_string(),
                "-static-libgcc".to_string(),
                "-pthread".to_string(),
                format!("-L{}", libcxx.join("lib64").display()),
                "-Wl,--high-entropy-va".to_string(),
                "-Wl,--Xlink=-Brepro".to_string(),
                format!("-L{}", zlib.join("lib").display()),
            ]);
            Ok(())
        }))
}
