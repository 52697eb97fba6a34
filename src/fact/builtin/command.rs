use std::collections::BTreeMap;

use serde::Deserialize;

use super::fact_plugin;
use crate::command;
use crate::data::{FactData, Format};
use crate::error::Error;
use crate::fact::{Fact, FactBase};
use crate::plugin::Plugin;

/// Runs a local command and records its exit code and output as a
/// `map-string` with keys `code`, `stdout` and `stderr`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommandFact {
    #[serde(flatten)]
    base: FactBase,
    pub cmd: String,
    pub args: Vec<String>,
    /// Keep the output of a failing command without recording an error.
    #[serde(rename = "ignore-error")]
    pub ignore_error: bool,
}

impl CommandFact {
    pub const NAME: &'static str = "command";

    pub fn new(id: &str) -> Self {
        Self {
            base: FactBase::with_format(id, Format::MapString),
            ..Default::default()
        }
    }
}

fact_plugin!(CommandFact, Some(Format::MapString));

impl Fact for CommandFact {
    fn base(&self) -> &FactBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FactBase {
        &mut self.base
    }

    fn collect(&mut self) {
        tracing::debug!(fact = %self.id(), cmd = %self.cmd, args = ?self.args, "collecting data");

        let output = match command::run(&self.cmd, &self.args) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(fact = %self.id(), error = %e, "command could not be started");
                self.add_errors(vec![e]);
                return;
            }
        };

        let mut result = BTreeMap::new();
        result.insert("code".to_string(), output.code.to_string());
        result.insert(
            "stdout".to_string(),
            output.stdout.trim_matches(|c| c == ' ' || c == '\n').to_string(),
        );
        result.insert("stderr".to_string(), String::new());

        if !output.success() {
            result.insert("stderr".to_string(), output.failure_message());
            if !self.ignore_error {
                tracing::error!(fact = %self.id(), code = output.code, "command failed");
                let e = Error::plugin(self.id(), output.failure_message());
                self.add_errors(vec![e]);
            }
        }

        self.base.set_data(FactData::MapString(result));
    }
}
