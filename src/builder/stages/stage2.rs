//! The shipped host compiler, built with stage1.

use crate::builder::cmake::{entry_hook, CMakeBuilder, InstallLocation};
use crate::builder::layers::{layer, LlvmLayer, ANDROID_TARGETS};
use crate::core::host::Host;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;

use super::host_tools::{libedit_lib, swig_executable};
use super::{install_into, StageOptions, LIBEDIT, STAGE2, SWIG};

pub fn stage2(paths: &Paths, host: Host, opts: &StageOptions) -> CMakeBuilder {
    let mut projects = vec![
        "clang",
        "lld",
        "libcxxabi",
        "libcxx",
        "compiler-rt",
        "clang-tools-extra",
        "openmp",
        "polly",
    ];
    if opts.build_lldb {
        projects.push("lldb");
    }
    let llvm = LlvmLayer {
        enable_assertions: opts.enable_assertions,
        clang_vendor: Some(opts.stage2_vendor()),
        patch_level: opts.patch_level.clone(),
        ..LlvmLayer::new(&projects, ANDROID_TARGETS)
    };

    let opts = opts.clone();
    let build_lldb = opts.build_lldb;
    let mut builder =
        CMakeBuilder::new(STAGE2, paths.llvm_path("llvm"), vec![ConfigEntry::host(host)])
            .install_to(InstallLocation::Fixed(paths.out_path("stage2-install")))
            .remove_install_dir()
            .layer(llvm)
            .boxed_layer(layer(move |cx, cfg| {
                let tc = cx.toolchain;
                let target_os = cx.target_os();
                let darwin = target_os == Some(Host::Darwin);

                // The just-built libc++ of stage1.
                cfg.env
                    .insert("LD_LIBRARY_PATH".into(), tc.lib_dir().display().to_string());

                if opts.instrumented {
                    // libc++ and libc++abi link with -nodefaultlibs
                    let profile_rt = tc.resource_dir()?.join("libclang_rt.profile-x86_64.a");
                    cfg.ldflags.push(profile_rt.display().to_string());
                }
                if opts.profdata.is_some() {
                    cfg.cflags.push("-Wno-profile-instr-out-of-date".into());
                    cfg.cflags.push("-Wno-profile-instr-unprofiled".into());
                }

                cfg.define("SANITIZER_ALLOW_CXXABI", "OFF")
                    .define("OPENMP_ENABLE_OMPT_TOOLS", "FALSE")
                    .define("LIBOMP_ENABLE_SHARED", "FALSE")
                    .define("CLANG_PYTHON_BINDINGS_VERSIONS", "3")
                    .define_bool("COMPILER_RT_BUILD_LIBFUZZER", !darwin);

                if opts.lto && !darwin && !opts.instrumented && !opts.debug {
                    cfg.define("LLVM_ENABLE_LTO", "Thin");
                }
                if opts.debug {
                    cfg.define("CMAKE_BUILD_TYPE", "Debug");
                }

                if opts.instrumented {
                    // Only needed to finish configuring perf-training.
                    cfg.define("LLVM_BUILD_INSTRUMENTED", "ON")
                        .define_path("LLVM_PROFDATA", tc.bin_dir().join("llvm-profdata"));
                } else if let Some(profdata) = &opts.profdata {
                    cfg.define_path("LLVM_PROFDATA_FILE", profdata);
                }

                match target_os {
                    Some(Host::Linux) => {
                        cfg.define("LIBCXX_ENABLE_STATIC_ABI_LIBRARY", "ON")
                            .define("LIBCXX_ENABLE_ABI_LINKER_SCRIPT", "OFF");
                    }
                    Some(Host::Darwin) => {
                        cfg.define("LLVM_BUILD_EXTERNAL_COMPILER_RT", "ON")
                            .define("HAVE_LIBCOMPRESSION", "0");
                    }
                    _ => {}
                }

                if build_lldb {
                    let os = target_os.unwrap_or(cx.host());
                    let libedit = cx.ctx.install_dir_of(LIBEDIT)?;
                    let swig = cx.ctx.install_dir_of(SWIG)?;
                    cfg.define("LLDB_ENABLE_PYTHON", "OFF")
                        .define("LLDB_ENABLE_LUA", "OFF")
                        .define("LLDB_ENABLE_LIBEDIT", "ON")
                        .define_path("LibEdit_INCLUDE_DIRS", libedit.join("include"))
                        .define_path("LibEdit_LIBRARIES", libedit_lib(&libedit, os))
                        .define_path("SWIG_EXECUTABLE", swig_executable(&swig));
                }
                Ok(())
            }));

    if build_lldb {
        builder = builder.after_install(entry_hook(|cx| {
            let os = cx.target_os().unwrap_or(cx.host());
            if os.is_windows() {
                return Ok(());
            }
            let libedit = cx.ctx.install_dir_of(LIBEDIT)?;
            install_into(&libedit_lib(&libedit, os), &cx.install_dir.join("lib64"))
        }));
    }
    builder
}
