//! Built-in fact plugins.

/// Implements the `Plugin` boilerplate for a fact holding `base: FactBase`.
macro_rules! fact_plugin {
    ($ty:ty, $default_format:expr) => {
        impl $crate::plugin::Plugin for $ty {
            fn plugin_name(&self) -> &'static str {
                Self::NAME
            }

            fn plugin_base(&self) -> &$crate::plugin::PluginBase {
                &self.base.plugin
            }

            fn plugin_base_mut(&mut self) -> &mut $crate::plugin::PluginBase {
                &mut self.base.plugin
            }

            fn configure(&mut self, raw: serde_yaml::Value) -> $crate::error::Result<()> {
                $crate::plugin::decode_into(self, "fact", raw)?;
                let default_format: Option<$crate::data::Format> = $default_format;
                if self.base.format.is_none() {
                    self.base.format = default_format;
                }
                Ok(())
            }
        }
    };
}

pub(crate) use fact_plugin;

mod command;
mod connection;
mod file;
mod yaml;

pub use command::CommandFact;
pub use connection::ConnectionOutput;
pub use file::{FileLookup, FileRead};
pub use yaml::YamlKey;

use super::Fact;
use crate::error::Result;
use crate::plugin::Manager;

/// Register every built-in fact factory.
pub fn register_all(manager: &Manager<dyn Fact>) -> Result<()> {
    manager.register_factory(CommandFact::NAME, |id| Box::new(CommandFact::new(id)))?;
    manager.register_factory(FileRead::NAME, |id| Box::new(FileRead::new(id)))?;
    manager.register_factory(FileLookup::NAME, |id| Box::new(FileLookup::new(id)))?;
    manager.register_factory(YamlKey::NAME, |id| Box::new(YamlKey::new(id)))?;
    manager.register_factory(ConnectionOutput::NAME, |id| {
        Box::new(ConnectionOutput::new(id))
    })?;
    Ok(())
}
