use serde::Deserialize;

use super::{RemediationResult, RemediationStatus, Remediator};
use crate::command;

/// Runs a local command; success is a zero exit status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandRemediator {
    #[serde(rename = "msg")]
    pub message: String,
    pub cmd: String,
    pub args: Vec<String>,
}

impl CommandRemediator {
    pub const NAME: &'static str = "command";
}

impl Remediator for CommandRemediator {
    fn plugin_name(&self) -> &'static str {
        Self::NAME
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn remediate(&self) -> RemediationResult {
        tracing::debug!(cmd = %self.cmd, args = ?self.args, "running remediation command");
        match command::run(&self.cmd, &self.args) {
            Ok(output) if output.success() => {
                RemediationResult::new(RemediationStatus::Success, output.stdout.trim())
            }
            Ok(output) => RemediationResult::new(RemediationStatus::Failed, output.failure_message()),
            Err(e) => RemediationResult::new(RemediationStatus::Failed, e.to_string()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn remediator(cmd: &str, args: &[&str]) -> CommandRemediator {
        CommandRemediator {
            message: String::new(),
            cmd: cmd.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn zero_exit_is_success() {
        let result = remediator("sh", &["-c", "echo fixed"]).remediate();
        assert_eq!(result, RemediationResult::new(RemediationStatus::Success, "fixed"));
    }

    #[test]
    fn non_zero_exit_is_failure() {
        let result = remediator("sh", &["-c", "echo nope >&2; exit 1"]).remediate();
        assert_eq!(result, RemediationResult::new(RemediationStatus::Failed, "nope"));
    }
}
