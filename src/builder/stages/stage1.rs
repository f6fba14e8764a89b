//! The bootstrap compiler, built with the prebuilt clang.

use crate::builder::cmake::{CMakeBuilder, InstallLocation};
use crate::builder::layers::{layer, LlvmLayer, ANDROID_TARGETS, BASE_TARGETS};
use crate::core::host::Host;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;

use super::{StageOptions, STAGE1};

pub fn stage1(paths: &Paths, host: Host, opts: &StageOptions) -> CMakeBuilder {
    let mut projects = vec!["clang", "lld", "libcxxabi", "libcxx", "compiler-rt"];
    if opts.build_llvm_tools {
        // lldb-tblgen, for lldb-server and the Windows lldb
        projects.push("lldb");
    }
    let targets = if opts.build_all_targets {
        ANDROID_TARGETS
    } else {
        BASE_TARGETS
    };
    let llvm = LlvmLayer {
        enable_assertions: opts.enable_assertions,
        clang_vendor: Some(opts.vendor()),
        patch_level: opts.patch_level.clone(),
        ..LlvmLayer::new(&projects, targets)
    };

    let build_llvm_tools = opts.build_llvm_tools;
    CMakeBuilder::new(STAGE1, paths.llvm_path("llvm"), vec![ConfigEntry::host(host)])
        .install_to(InstallLocation::Fixed(paths.out_path("stage1-install")))
        .layer(llvm)
        .boxed_layer(layer(move |cx, cfg| {
            // Keep the prebuilt libc++ ahead of the one being built.
            cfg.ldflags
                .push(format!("-Wl,-rpath,{}", cx.toolchain.lib_dir().display()));

            cfg.define("CLANG_ENABLE_ARCMT", "OFF")
                .define("CLANG_ENABLE_STATIC_ANALYZER", "OFF")
                .define_bool("LLVM_BUILD_TOOLS", build_llvm_tools)
                .define("COMPILER_RT_BUILD_LIBFUZZER", "OFF");
            if build_llvm_tools {
                cfg.define("LLDB_ENABLE_PYTHON", "OFF")
                    .define("LLDB_ENABLE_LIBEDIT", "OFF");
            }

            match cx.target_os() {
                Some(Host::Linux) => {
                    cfg.define("LIBCXX_ENABLE_ABI_LINKER_SCRIPT", "OFF")
                        .define("LIBCXX_ENABLE_STATIC_ABI_LIBRARY", "ON");
                }
                Some(Host::Darwin) => {
                    cfg.define("LLVM_BUILD_EXTERNAL_COMPILER_RT", "ON");
                }
                _ => {}
            }
            Ok(())
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildOutcome, Builder};
    use crate::test_support::{MockRunner, TestEnv};
    use std::sync::Arc;

    fn build(env: &mut TestEnv, opts: &StageOptions) {
        let builder = Arc::new(stage1(&env.paths, Host::Linux, opts));
        env.ctx.builders.register(builder.clone()).unwrap();
        assert_eq!(builder.build(&mut env.ctx).unwrap(), BuildOutcome::Built);
    }

    #[test]
    fn test_default_configuration() {
        let mut env = TestEnv::new(MockRunner::new());
        build(&mut env, &StageOptions::default());

        let configures = env.runner.configures_in("stage1");
        assert_eq!(configures.len(), 1);
        let call = &configures[0];
        assert_eq!(
            call.define("LLVM_ENABLE_PROJECTS"),
            Some("clang;compiler-rt;libcxx;libcxxabi;lld")
        );
        assert_eq!(call.define("LLVM_TARGETS_TO_BUILD"), Some("X86"));
        assert_eq!(call.define("LLVM_BUILD_TOOLS"), Some("OFF"));
        assert_eq!(call.define("LIBCXX_ENABLE_STATIC_ABI_LIBRARY"), Some("ON"));
        assert_eq!(call.define("LLDB_ENABLE_PYTHON"), None);
        assert!(call
            .define("CMAKE_INSTALL_PREFIX")
            .unwrap()
            .ends_with("out/stage1-install"));

        let prebuilt_lib = env.paths.prebuilt_clang.join("lib64");
        let ldflags = call.define("CMAKE_EXE_LINKER_FLAGS").unwrap();
        assert!(ldflags.contains(&format!("-Wl,-rpath,{}", prebuilt_lib.display())));
    }

    #[test]
    fn test_llvm_tools_and_all_targets() {
        let mut env = TestEnv::new(MockRunner::new());
        let opts = StageOptions {
            build_llvm_tools: true,
            build_all_targets: true,
            ..Default::default()
        };
        build(&mut env, &opts);

        let call = &env.runner.configures_in("stage1")[0];
        assert!(call.define("LLVM_ENABLE_PROJECTS").unwrap().contains("lldb"));
        assert_eq!(call.define("LLVM_TARGETS_TO_BUILD"), Some("AArch64;ARM;BPF;X86"));
        assert_eq!(call.define("LLVM_BUILD_TOOLS"), Some("ON"));
        assert_eq!(call.define("LLDB_ENABLE_LIBEDIT"), Some("OFF"));
    }

    #[test]
    fn test_darwin_uses_external_compiler_rt() {
        let env = TestEnv::new(MockRunner::new());
        let builder = stage1(&env.paths, Host::Darwin, &StageOptions::default());
        let cfg = builder
            .entry_config(&env.ctx, &ConfigEntry::host(Host::Darwin))
            .unwrap();
        assert_eq!(cfg.get("LLVM_BUILD_EXTERNAL_COMPILER_RT"), Some("ON"));
        assert_eq!(cfg.get("LIBCXX_ENABLE_STATIC_ABI_LIBRARY"), None);
        assert_eq!(cfg.get("CMAKE_OSX_DEPLOYMENT_TARGET"), Some("10.10"));
    }
}
