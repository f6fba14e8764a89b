//! The seam through which builders run external commands.

use anyhow::Result;

use crate::builder::BuildError;
use crate::util::process::ProcessBuilder;

/// Runs external commands on behalf of builders.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion. A non-zero exit is an error.
    fn run(&self, cmd: &ProcessBuilder) -> Result<()>;
}

/// Runs commands as child processes, capturing their output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<()> {
        let command = cmd.display_command();
        tracing::debug!(cwd = ?cmd.get_cwd(), "running `{}`", command);

        let output = cmd.exec().map_err(|e| BuildError::Spawn {
            source: e
                .downcast::<std::io::Error>()
                .unwrap_or_else(|e| std::io::Error::other(e.to_string())),
            command: command.clone(),
        })?;

        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                command,
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(())
    }
}
