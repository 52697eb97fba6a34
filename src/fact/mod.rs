//! Facts: named units of collected, typed data.

pub mod builtin;
pub mod collector;

use std::borrow::Cow;

use serde::Deserialize;

use crate::connection::Connection;
use crate::data::{FactData, Format};
use crate::plugin::{Capabilities, Handle, Plugin, PluginBase};

pub use collector::{CollectOutcome, Collector};

/// Fields shared by every fact, flattened into each plugin's config struct.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FactBase {
    #[serde(skip)]
    pub plugin: PluginBase,
    pub format: Option<Format>,
    #[serde(rename = "connection")]
    pub connection_name: String,
    #[serde(rename = "input")]
    pub input_name: String,
    #[serde(rename = "additional-inputs")]
    pub additional_input_names: Vec<String>,
    #[serde(skip)]
    data: Option<FactData>,
    #[serde(skip)]
    connection: Option<Handle<dyn Connection>>,
    #[serde(skip)]
    input: Option<Handle<dyn Fact>>,
    #[serde(skip)]
    additional_inputs: Vec<Handle<dyn Fact>>,
}

impl FactBase {
    pub fn new(id: &str) -> Self {
        Self {
            plugin: PluginBase::new(id),
            ..Default::default()
        }
    }

    pub fn with_format(id: &str, format: Format) -> Self {
        Self {
            format: Some(format),
            ..Self::new(id)
        }
    }

    pub fn set_data(&mut self, data: FactData) {
        self.data = Some(data);
    }

    pub fn connection(&self) -> Option<&Handle<dyn Connection>> {
        self.connection.as_ref()
    }

    pub fn input(&self) -> Option<&Handle<dyn Fact>> {
        self.input.as_ref()
    }

    pub fn additional_inputs(&self) -> &[Handle<dyn Fact>] {
        &self.additional_inputs
    }

    /// Attach the dependencies resolved by negotiation.
    pub fn bind(
        &mut self,
        connection: Option<Handle<dyn Connection>>,
        input: Option<Handle<dyn Fact>>,
        additional_inputs: Vec<Handle<dyn Fact>>,
    ) {
        self.connection = connection;
        self.input = input;
        self.additional_inputs = additional_inputs;
    }
}

/// A fact plugin.
///
/// Implementors hold a [`FactBase`] and provide [`Fact::collect`]; the
/// [`Collector`] negotiates and binds dependencies before calling it.
pub trait Fact: Plugin {
    fn base(&self) -> &FactBase;

    fn base_mut(&mut self) -> &mut FactBase;

    /// Connection and input support; nothing is accepted by default.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Populate data or errors. Called at most once per run.
    fn collect(&mut self);

    fn format(&self) -> Option<Format> {
        self.base().format
    }

    /// Collected data, or the zero value of the declared format.
    fn data(&self) -> Cow<'_, FactData> {
        match &self.base().data {
            Some(data) => Cow::Borrowed(data),
            None => Cow::Owned(self.format().map(FactData::zero).unwrap_or_default()),
        }
    }

    fn connection_name(&self) -> &str {
        &self.base().connection_name
    }

    fn input_name(&self) -> &str {
        &self.base().input_name
    }

    fn additional_input_names(&self) -> &[String] {
        &self.base().additional_input_names
    }
}

/// Read the primary input's data, or `None` when no input is bound.
pub(crate) fn input_data(base: &FactBase) -> Option<FactData> {
    base.input().map(|input| input.read().data().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubFact;

    #[test]
    fn data_defaults_to_zero_of_declared_format() {
        let mut fact = StubFact::new("f");
        assert_eq!(*fact.data(), FactData::Nil);

        fact.base_mut().format = Some(Format::MapString);
        assert_eq!(fact.data().format(), Format::MapString);
        assert!(fact.data().is_empty());

        fact.base_mut().set_data(FactData::String("x".into()));
        assert_eq!(fact.data().as_string(), "x");
    }

    #[test]
    fn base_fields_decode_from_kebab_case() {
        let base: FactBase = serde_yaml::from_str(
            "format: list\nconnection: shell\ninput: upstream\nadditional-inputs: [a, b]\n",
        )
        .unwrap();
        assert_eq!(base.format, Some(Format::List));
        assert_eq!(base.connection_name, "shell");
        assert_eq!(base.input_name, "upstream");
        assert_eq!(base.additional_input_names, vec!["a", "b"]);
    }
}
