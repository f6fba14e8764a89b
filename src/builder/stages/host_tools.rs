//! Host libraries and tools lldb depends on.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::builder::autoconf::AutoconfBuilder;
use crate::builder::cmake::entry_hook;
use crate::core::host::Host;
use crate::core::matrix::ConfigEntry;
use crate::core::paths::Paths;
use crate::util::process::ProcessBuilder;

use super::{LIBEDIT, SWIG};

pub fn swig(paths: &Paths, host: Host) -> AutoconfBuilder {
    AutoconfBuilder::new(
        SWIG,
        paths.android_path("toolchain/swig"),
        vec![ConfigEntry::host(host)],
        paths.out_path("swig-install"),
    )
    .config_flag("--without-pcre")
    .rpath_to_toolchain()
}

pub fn libedit(paths: &Paths, host: Host) -> AutoconfBuilder {
    AutoconfBuilder::new(
        LIBEDIT,
        paths.android_path("toolchain/libedit/src"),
        vec![ConfigEntry::host(host)],
        paths.out_path("libedit-install"),
    )
    .after_install(entry_hook(|cx| {
        if cx.target_os() != Some(Host::Darwin) {
            return Ok(());
        }
        // Consumers should find libedit through their rpath.
        let lib = libedit_lib(cx.install_dir, Host::Darwin);
        let name = lib
            .file_name()
            .with_context(|| format!("{} has no file name", lib.display()))?
            .to_string_lossy()
            .into_owned();
        let cmd = ProcessBuilder::new("install_name_tool")
            .arg("-id")
            .arg(format!("@rpath/{}", name))
            .arg(&lib)
            .env_clear()
            .envs(&cx.ctx.base_env);
        cx.ctx.runner.run(&cmd)
    }))
}

/// The shared libedit inside an install of the `libedit` builder.
pub fn libedit_lib(install_dir: &Path, host: Host) -> PathBuf {
    let name = match host {
        Host::Darwin => "libedit.0.dylib",
        _ => "libedit.so.0",
    };
    install_dir.join("lib").join(name)
}

/// The swig executable inside an install of the `swig` builder.
pub fn swig_executable(install_dir: &Path) -> PathBuf {
    install_dir.join("bin").join("swig")
}
