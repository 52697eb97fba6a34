//! Synchronous process execution shared by the command fact, the docker
//! connection and the command remediator.

use std::process::{Command, Output};

use crate::error::{Error, Result};

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    fn from_output(output: Output) -> Self {
        Self {
            // Signal-terminated processes have no code.
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// Best available failure message: stderr, else the exit code.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit status {}", self.code)
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program` with `args`, waiting for it to exit.
///
/// Only a spawn failure is an error; a non-zero exit is reported through
/// [`CommandOutput::code`].
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<CommandOutput> {
    tracing::debug!(program, args = ?args.iter().map(AsRef::as_ref).collect::<Vec<_>>(), "running command");
    let output = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .output()
        .map_err(|e| Error::Io(format!("failed to run '{program}': {e}")))?;
    Ok(CommandOutput::from_output(output))
}
