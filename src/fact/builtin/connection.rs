use serde::Deserialize;

use super::fact_plugin;
use crate::connection::DockerExec;
use crate::data::{FactData, Format};
use crate::fact::{Fact, FactBase};
use crate::plugin::{Capabilities, Capability, Plugin};

/// Runs its connection and keeps the trimmed output as a string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionOutput {
    #[serde(flatten)]
    base: FactBase,
}

impl ConnectionOutput {
    pub const NAME: &'static str = "connection:output";

    pub fn new(id: &str) -> Self {
        Self {
            base: FactBase::with_format(id, Format::String),
        }
    }
}

fact_plugin!(ConnectionOutput, Some(Format::String));

impl Fact for ConnectionOutput {
    fn base(&self) -> &FactBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FactBase {
        &mut self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            connections: Capability::required(vec![DockerExec::NAME]),
            inputs: Capability::none(),
        }
    }

    fn collect(&mut self) {
        let Some(connection) = self.base.connection().cloned() else {
            return;
        };
        let result = connection.read().run();
        match result {
            Ok(bytes) => {
                let output = String::from_utf8_lossy(&bytes).trim().to_string();
                self.base.set_data(FactData::String(output));
            }
            Err(e) => {
                tracing::error!(fact = %self.id(), error = %e, "connection failed");
                self.add_errors(vec![e]);
            }
        }
    }
}
