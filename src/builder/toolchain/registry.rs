//! The two toolchain roles tracked during a run.

use std::sync::Arc;

use thiserror::Error;

use super::ToolchainHandle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolchainError {
    #[error("output toolchain is already set to {0}")]
    OutputAlreadySet(String),

    #[error("output toolchain is not set yet")]
    OutputNotSet,
}

/// Holds the runtime toolchain (reassignable, defaults to the bootstrap
/// prebuilt) and the output toolchain (write-once).
#[derive(Debug)]
pub struct ToolchainRegistry {
    runtime: Arc<ToolchainHandle>,
    output: Option<Arc<ToolchainHandle>>,
}

impl ToolchainRegistry {
    pub fn new(bootstrap: Arc<ToolchainHandle>) -> Self {
        ToolchainRegistry {
            runtime: bootstrap,
            output: None,
        }
    }

    /// The toolchain currently used to compile runtime libraries.
    pub fn runtime(&self) -> Arc<ToolchainHandle> {
        Arc::clone(&self.runtime)
    }

    pub fn set_runtime(&mut self, handle: Arc<ToolchainHandle>) {
        tracing::debug!("runtime toolchain is now {}", handle.path().display());
        self.runtime = handle;
    }

    /// The toolchain being produced by this run.
    pub fn output(&self) -> Result<Arc<ToolchainHandle>, ToolchainError> {
        self.output.clone().ok_or(ToolchainError::OutputNotSet)
    }

    pub fn set_output(&mut self, handle: Arc<ToolchainHandle>) -> Result<(), ToolchainError> {
        if let Some(existing) = &self.output {
            return Err(ToolchainError::OutputAlreadySet(
                existing.path().display().to_string(),
            ));
        }
        tracing::debug!("output toolchain is {}", handle.path().display());
        self.output = Some(handle);
        Ok(())
    }
}
