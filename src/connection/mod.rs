//! Connections: reusable handles for reaching an external system.

mod docker;

use crate::error::Result;
use crate::plugin::{Manager, Plugin};

pub use docker::DockerExec;

pub trait Connection: Plugin {
    /// Execute against the target and return its raw output.
    fn run(&self) -> Result<Vec<u8>>;
}

/// Register the built-in connection plugins.
pub fn register_all(manager: &Manager<dyn Connection>) -> Result<()> {
    manager.register_factory(DockerExec::NAME, |id| Box::new(DockerExec::new(id)))?;
    Ok(())
}
