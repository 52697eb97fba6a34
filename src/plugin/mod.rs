//! Plugin contract shared by every plugin family.
//!
//! Facts, connections, analysers and outputs are all plugins: a type name
//! shared by every instance of a kind, a per-instance id taken from the
//! configuration key, and an ordered list of errors accumulated during the
//! instance's lifecycle. Each family is held in its own [`Manager`].

pub mod manager;
pub mod support;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub use manager::{Factory, Handle, Manager, PluginConfigs};
pub use support::{negotiate, Capabilities, Capability, SupportKind, SupportLevel};

/// Fields common to every plugin instance.
#[derive(Debug, Clone, Default)]
pub struct PluginBase {
    pub id: String,
    errors: Vec<Error>,
}

impl PluginBase {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            errors: Vec::new(),
        }
    }
}

/// The minimal shape of a plugin instance.
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Plugin-type name, e.g. `"file:lookup"`.
    fn plugin_name(&self) -> &'static str;

    fn plugin_base(&self) -> &PluginBase;

    fn plugin_base_mut(&mut self) -> &mut PluginBase;

    /// Decode the instance's configuration fields.
    fn configure(&mut self, raw: serde_yaml::Value) -> Result<()>;

    fn id(&self) -> &str {
        &self.plugin_base().id
    }

    fn errors(&self) -> &[Error] {
        &self.plugin_base().errors
    }

    fn add_errors(&mut self, errs: Vec<Error>) {
        self.plugin_base_mut().errors.extend(errs);
    }
}

/// Replace `target` with an instance decoded from `raw`, keeping its id.
///
/// Plugins implement [`Plugin::configure`] with this helper; fields absent
/// from `raw` take the type's serde defaults.
pub fn decode_into<T>(target: &mut T, family: &str, raw: serde_yaml::Value) -> Result<()>
where
    T: Plugin + DeserializeOwned,
{
    let raw = if raw.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        raw
    };
    let id = target.id().to_string();
    let mut decoded: T = serde_yaml::from_value(raw).map_err(|e| Error::Decode {
        family: family.to_string(),
        id: id.clone(),
        message: e.to_string(),
    })?;
    decoded.plugin_base_mut().id = id;
    *target = decoded;
    Ok(())
}
