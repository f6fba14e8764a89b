//! Clang version triple read from an installed `Version.inc` header.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Location of the version header relative to an install root.
pub const VERSION_HEADER: &str = "include/clang/Basic/Version.inc";

static VERSION_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CLANG_VERSION_(MAJOR|MINOR|PATCHLEVEL)\s+(\d+)").unwrap());

/// The version metadata of a toolchain install is missing or malformed.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("missing toolchain metadata: cannot read {}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed toolchain metadata in {}: `{key}` not found", path.display())]
    MissingField { path: PathBuf, key: &'static str },
}

/// A parsed clang version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClangVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ClangVersion {
    /// Read and parse the version header under `install_root`.
    pub fn from_install(install_root: &Path) -> Result<ClangVersion, VersionError> {
        Self::from_file(&install_root.join(VERSION_HEADER))
    }

    /// Read and parse a version header file.
    pub fn from_file(path: &Path) -> Result<ClangVersion, VersionError> {
        let text = std::fs::read_to_string(path).map_err(|source| VersionError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse header text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<ClangVersion, VersionError> {
        let (mut major, mut minor, mut patch) = (None, None, None);
        for caps in VERSION_FIELD.captures_iter(text) {
            let slot = match &caps[1] {
                "MAJOR" => &mut major,
                "MINOR" => &mut minor,
                _ => &mut patch,
            };
            if slot.is_none() {
                *slot = caps[2].parse::<u32>().ok();
            }
        }

        let require = |value: Option<u32>, key: &'static str| {
            value.ok_or_else(|| VersionError::MissingField {
                path: origin.to_path_buf(),
                key,
            })
        };

        Ok(ClangVersion {
            major: require(major, "CLANG_VERSION_MAJOR")?,
            minor: require(minor, "CLANG_VERSION_MINOR")?,
            patch: require(patch, "CLANG_VERSION_PATCHLEVEL")?,
        })
    }

    /// `major.minor.patch`
    pub fn long_version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// `major.minor`
    pub fn short_version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn major_version(&self) -> String {
        self.major.to_string()
    }
}

impl fmt::Display for ClangVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.long_version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "#define CLANG_VERSION 12.0.1\n\
                          #define CLANG_VERSION_STRING \"12.0.1\"\n\
                          #define CLANG_VERSION_MAJOR 12\n\
                          #define CLANG_VERSION_MINOR 0\n\
                          #define CLANG_VERSION_PATCHLEVEL 1\n";

    #[test]
    fn test_parse_version_header() {
        let version = ClangVersion::parse(HEADER, Path::new("Version.inc")).unwrap();
        assert_eq!(version.long_version(), "12.0.1");
        assert_eq!(version.short_version(), "12.0");
        assert_eq!(version.major_version(), "12");
    }

    #[test]
    fn test_missing_minor_fails() {
        let text = "#define CLANG_VERSION_MAJOR 12\n#define CLANG_VERSION_PATCHLEVEL 1\n";
        let err = ClangVersion::parse(text, Path::new("Version.inc")).unwrap_err();
        assert!(matches!(
            err,
            VersionError::MissingField {
                key: "CLANG_VERSION_MINOR",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_header_fails() {
        let tmp = TempDir::new().unwrap();
        let err = ClangVersion::from_install(tmp.path()).unwrap_err();
        assert!(matches!(err, VersionError::Missing { .. }));
        assert!(err.to_string().contains("missing toolchain metadata"));
    }

    #[test]
    fn test_from_install() {
        let tmp = TempDir::new().unwrap();
        let header = tmp.path().join(VERSION_HEADER);
        std::fs::create_dir_all(header.parent().unwrap()).unwrap();
        std::fs::write(&header, HEADER).unwrap();

        let version = ClangVersion::from_install(tmp.path()).unwrap();
        assert_eq!(version, ClangVersion { major: 12, minor: 0, patch: 1 });
    }
}
