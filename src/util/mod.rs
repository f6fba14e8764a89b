//! Shared utilities

pub mod config;
pub mod fs;
pub mod hash;
pub mod process;
pub mod timer;

pub use config::Config;
pub use process::ProcessBuilder;
pub use timer::StageTimer;
