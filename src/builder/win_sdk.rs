//! Windows SDK tree preparation for cross-compiling with a case-sensitive
//! filesystem.
//!
//! The SDK ships headers and import libraries with mixed-case names while
//! sources include them in lower case. [`WinSdk::prepare`] adds lowercase
//! alias symlinks next to the originals. It may be called any number of
//! times; every call re-creates the aliases from the current tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::fs::symlink;

/// Extra aliases that are not plain lowercasing: (subdir, file, alias).
const EXTRA_ALIASES: &[(&str, &str, &str)] = &[
    ("um", "Windows.h", "windows.h"),
    ("um", "WinBase.h", "winbase.h"),
    ("um", "WinUser.h", "winuser.h"),
    ("um", "WinNls.h", "winnls.h"),
    ("um", "Ole2.h", "ole2.h"),
    ("shared", "driverspecs.h", "DriverSpecs.h"),
    ("shared", "specstrings.h", "SpecStrings.h"),
    ("shared", "WTypesbase.h", "wtypesbase.h"),
];

/// A Windows SDK tree (`Include/<version>/...`, `Lib/<version>/...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinSdk {
    root: PathBuf,
    version: String,
}

impl WinSdk {
    /// Open the SDK at `root`. The version is the first directory under `Include`.
    pub fn open(root: &Path) -> Result<WinSdk> {
        let include = root.join("Include");
        let mut versions = fs::read_dir(&include)
            .with_context(|| format!("failed to read Windows SDK at {}", include.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        versions.sort();
        let version = versions
            .into_iter()
            .next()
            .with_context(|| format!("no SDK version found under {}", include.display()))?;
        Ok(WinSdk {
            root: root.to_path_buf(),
            version,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn include_dir(&self, sub: &str) -> PathBuf {
        self.root.join("Include").join(&self.version).join(sub)
    }

    pub fn x64_lib_dir(&self) -> PathBuf {
        self.root.join("Lib").join(&self.version).join("um").join("x64")
    }

    /// Create every alias. Returns how many symlinks were (re)created.
    pub fn prepare(&self) -> Result<usize> {
        let mut created = 0;
        for dir in [self.include_dir("um"), self.x64_lib_dir()] {
            for file in list_files(&dir)? {
                let lower = file_name(&file).to_lowercase();
                created += alias(&file, &lower)? as usize;
            }
        }
        for (sub, name, alias_name) in EXTRA_ALIASES {
            let file = self.include_dir(sub).join(name);
            if file.exists() {
                created += alias(&file, alias_name)? as usize;
            } else {
                tracing::debug!("Windows SDK has no {}", file.display());
            }
        }
        tracing::info!(
            "Prepared Windows SDK {} at {} ({} aliases)",
            self.version,
            self.root.display(),
            created
        );
        Ok(created)
    }
}

/// Regular files in `dir`, sorted; alias symlinks are skipped.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Point `<dir of file>/<alias>` at `file` with a relative symlink.
///
/// Existing symlinks are replaced. A real file with the alias name is left alone.
fn alias(file: &Path, alias: &str) -> Result<bool> {
    let name = file_name(file);
    if name == alias {
        return Ok(false);
    }
    let Some(dir) = file.parent() else {
        return Ok(false);
    };
    let link = dir.join(alias);
    match fs::symlink_metadata(&link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(&link)
                .with_context(|| format!("failed to remove {}", link.display()))?;
        }
        Ok(_) => return Ok(false),
        Err(_) => {}
    }
    symlink(Path::new(&name), &link)
        .with_context(|| format!("failed to link {} -> {}", link.display(), name))?;
    Ok(true)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sdk_tree(root: &Path) {
        let inc = root.join("Include/10.0.17763.0");
        fs::create_dir_all(inc.join("um")).unwrap();
        fs::create_dir_all(inc.join("shared")).unwrap();
        fs::create_dir_all(root.join("Lib/10.0.17763.0/um/x64")).unwrap();
        for f in ["Windows.h", "WinBase.h", "objbase.h"] {
            fs::write(inc.join("um").join(f), f).unwrap();
        }
        fs::write(inc.join("shared/driverspecs.h"), "").unwrap();
        fs::write(root.join("Lib/10.0.17763.0/um/x64/Kernel32.Lib"), "").unwrap();
    }

    #[test]
    fn test_open_reads_version() {
        let tmp = TempDir::new().unwrap();
        sdk_tree(tmp.path());
        let sdk = WinSdk::open(tmp.path()).unwrap();
        assert_eq!(sdk.version(), "10.0.17763.0");
    }

    #[test]
    fn test_prepare_creates_aliases() {
        let tmp = TempDir::new().unwrap();
        sdk_tree(tmp.path());
        let sdk = WinSdk::open(tmp.path()).unwrap();
        sdk.prepare().unwrap();

        let um = sdk.include_dir("um");
        assert_eq!(fs::read_to_string(um.join("windows.h")).unwrap(), "Windows.h");
        assert_eq!(fs::read_link(um.join("winbase.h")).unwrap(), Path::new("WinBase.h"));
        assert!(sdk.x64_lib_dir().join("kernel32.lib").exists());
        assert!(sdk.include_dir("shared").join("DriverSpecs.h").exists());
    }

    #[test]
    fn test_prepare_is_reentrant() {
        let tmp = TempDir::new().unwrap();
        sdk_tree(tmp.path());
        let sdk = WinSdk::open(tmp.path()).unwrap();
        let first = sdk.prepare().unwrap();

        // A header added between calls gets its alias on the next call.
        fs::write(sdk.include_dir("um").join("Ole2.h"), "").unwrap();
        let second = sdk.prepare().unwrap();

        assert_eq!(second, first + 2);
        assert!(sdk.include_dir("um").join("ole2.h").exists());
        assert_eq!(
            fs::read_link(sdk.include_dir("um").join("windows.h")).unwrap(),
            Path::new("Windows.h")
        );
    }

    #[test]
    fn test_missing_sdk() {
        let tmp = TempDir::new().unwrap();
        assert!(WinSdk::open(tmp.path()).is_err());
    }
}
