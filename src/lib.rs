//! Stagehand - a multi-stage Clang/LLVM toolchain build orchestrator
//!
//! This crate provides the library behind the `stagehand` binary: the
//! configuration matrix, the builders and their registries, and the
//! pipeline that bootstraps, cross-compiles, and packages a toolchain.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for stagehand unit tests.
///
/// Only available when compiling tests. Provides a recording command
/// runner and fake source and install trees.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildContext, Builder, BuilderRegistry, ToolchainHandle, ToolchainRegistry};
pub use core::{ClangVersion, ConfigEntry, ConfigMatrix, Host, Paths};
pub use util::Config;
