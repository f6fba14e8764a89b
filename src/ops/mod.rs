//! High-level operations.
//!
//! This module contains the implementation of stagehand commands: source
//! setup, the pipeline driver, and packaging.

pub mod package;
pub mod pipeline;
pub mod sources;

pub use package::{package_toolchain, PackageOptions, PackageResult};
pub use pipeline::{
    apply_filters, register_builders, run_pipeline, Component, PipelineOptions, PipelinePlan,
    PipelineReport,
};
pub use sources::{setup_sources, SourceOptions, SourceUpdate};
