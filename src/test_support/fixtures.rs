//! Filesystem fixtures: source trees and install trees the way the
//! pipeline expects to find them.

use std::path::{Path, PathBuf};

use crate::core::host::Host;
use crate::core::paths::Paths;
use crate::ops::package::{shipped_binaries, shipped_libraries};

use super::fake_install;

/// Write `(relative path, contents)` pairs under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

/// A finished install tree for `host` with everything packaging needs,
/// plus the license and header inputs it reads from the source tree.
pub fn fake_package_tree(paths: &Paths, host: Host, version: (u32, u32, u32)) -> PathBuf {
    let name = if host.is_windows() {
        "windows-x86-64-install"
    } else {
        "stage2-install"
    };
    let install = fake_install(&paths.out_dir, name, version);

    let bin = install.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    for binary in shipped_binaries(host, &version.0.to_string(), true) {
        let contents = match binary.as_str() {
            "git-clang-format" | "scan-build" | "scan-view" => "#!/usr/bin/env python3\n",
            _ => "\x7fELF",
        };
        std::fs::write(bin.join(binary), contents).unwrap();
    }

    let lib64 = install.join("lib64");
    std::fs::create_dir_all(&lib64).unwrap();
    for lib in shipped_libraries(host) {
        if lib != "libwinpthread-1.dll" {
            std::fs::write(lib64.join(lib), "!<arch>\n").unwrap();
        }
    }
    if host.is_windows() {
        write_tree(
            &paths.gcc_root(Host::Windows),
            &[("x86_64-w64-mingw32/bin/libwinpthread-1.dll", "MZ")],
        );
    }

    write_tree(
        &paths.android_path("bionic/libc/include"),
        &[
            ("stdatomic.h", "#pragma once\n"),
            ("bits/stdatomic.h", "#pragma once\n"),
        ],
    );
    write_tree(
        &paths.android_path("toolchain/llvm_android"),
        &[("MODULE_LICENSE_BSD_LIKE", "")],
    );
    for project in ["llvm", "clang", "lld"] {
        let license = format!("{} license", project);
        write_tree(&paths.llvm_path(project), &[("LICENSE.TXT", license.as_str())]);
    }
    install
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_paths;
    use tempfile::TempDir;

    #[test]
    fn test_fake_package_tree_is_a_toolchain() {
        let tmp = TempDir::new().unwrap();
        let paths = test_paths(tmp.path());
        let install = fake_package_tree(&paths, Host::Linux, (12, 0, 1));

        assert!(install.join("bin/clang-12").is_file());
        assert!(install.join("lib64/libc++.a").is_file());
        let version = crate::core::version::ClangVersion::from_install(&install).unwrap();
        assert_eq!(version.short_version(), "12.0");
    }
}
