use serde::Deserialize;

use super::Connection;
use crate::command;
use crate::error::{Error, Result};
use crate::plugin::{decode_into, Plugin, PluginBase};

/// Runs a command inside a running container via `docker exec`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DockerExec {
    #[serde(skip)]
    base: PluginBase,
    pub container: String,
    pub command: Vec<String>,
}

impl DockerExec {
    pub const NAME: &'static str = "docker:exec";

    pub fn new(id: &str) -> Self {
        Self {
            base: PluginBase::new(id),
            ..Default::default()
        }
    }

    fn args(&self) -> Vec<&str> {
        let mut args = vec!["exec", self.container.as_str()];
        args.extend(self.command.iter().map(String::as_str));
        args
    }
}

impl Plugin for DockerExec {
    fn plugin_name(&self) -> &'static str {
        Self::NAME
    }

    fn plugin_base(&self) -> &PluginBase {
        &self.base
    }

    fn plugin_base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }

    fn configure(&mut self, raw: serde_yaml::Value) -> Result<()> {
        decode_into(self, "connection", raw)
    }
}

impl Connection for DockerExec {
    fn run(&self) -> Result<Vec<u8>> {
        if self.container.is_empty() {
            return Err(Error::plugin(self.id(), "no container specified"));
        }
        let output = command::run("docker", &self.args())?;
        if !output.success() {
            return Err(Error::plugin(self.id(), output.failure_message()));
        }
        Ok(output.stdout.into_bytes())
    }
}
