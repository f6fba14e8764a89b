//! Core data model: hosts, architectures, configuration matrices, versions.

pub mod host;
pub mod matrix;
pub mod paths;
pub mod version;

pub use host::{Arch, Host};
pub use matrix::{ConfigEntry, ConfigMatrix, MatrixError, SysrootKind, TargetPlatform, Variant};
pub use paths::Paths;
pub use version::{ClangVersion, VersionError};
