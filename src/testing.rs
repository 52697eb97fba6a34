//! Stub plugins shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use crate::connection::Connection;
use crate::data::{FactData, Format};
use crate::error::{Error, Result};
use crate::fact::{Fact, FactBase};
use crate::plugin::{decode_into, Capabilities, Capability, Handle, Manager, Plugin, PluginBase};

/// Fact whose `collect` counts calls and either fails or stores `value`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StubFact {
    #[serde(flatten)]
    pub base: FactBase,
    pub fail: bool,
    pub value: String,
    #[serde(skip)]
    pub calls: Arc<AtomicUsize>,
}

impl StubFact {
    pub fn new(id: &str) -> Self {
        Self {
            base: FactBase::new(id),
            ..Default::default()
        }
    }
}

impl Plugin for StubFact {
    fn plugin_name(&self) -> &'static str {
        "stub"
    }

    fn plugin_base(&self) -> &PluginBase {
        &self.base.plugin
    }

    fn plugin_base_mut(&mut self) -> &mut PluginBase {
        &mut self.base.plugin
    }

    fn configure(&mut self, raw: serde_yaml::Value) -> Result<()> {
        decode_into(self, "fact", raw)
    }
}

impl Fact for StubFact {
    fn base(&self) -> &FactBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FactBase {
        &mut self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            connections: Capability::optional(vec!["stub-conn"]),
            inputs: Capability::optional(vec![
                Format::Raw,
                Format::String,
                Format::List,
                Format::MapString,
                Format::MapListString,
                Format::MapNestedString,
                Format::MapBytes,
                Format::Nil,
            ]),
        }
    }

    fn collect(&mut self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            let id = self.id().to_string();
            self.add_errors(vec![Error::plugin(id, "stub failure")]);
            return;
        }
        let value = self.value.clone();
        self.base.set_data(FactData::String(value));
    }
}

#[derive(Debug, Default)]
pub struct StubConnection {
    base: PluginBase,
    pub output: Vec<u8>,
}

impl Plugin for StubConnection {
    fn plugin_name(&self) -> &'static str {
        "stub-conn"
    }

    fn plugin_base(&self) -> &PluginBase {
        &self.base
    }

    fn plugin_base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }

    fn configure(&mut self, _raw: serde_yaml::Value) -> Result<()> {
        Ok(())
    }
}

impl Connection for StubConnection {
    fn run(&self) -> Result<Vec<u8>> {
        Ok(self.output.clone())
    }
}

pub fn fact_manager() -> Manager<dyn Fact> {
    let facts: Manager<dyn Fact> = Manager::new("fact");
    facts
        .register_factory("stub", |id| Box::new(StubFact::new(id)))
        .unwrap();
    facts
}

pub fn connection_manager() -> Manager<dyn Connection> {
    let connections: Manager<dyn Connection> = Manager::new("connection");
    connections
        .register_factory("stub-conn", |id| {
            Box::new(StubConnection {
                base: PluginBase::new(id),
                output: Vec::new(),
            })
        })
        .unwrap();
    connections
}

/// Build a stub fact with the given primary input, returning its handle
/// and call counter.
pub fn add_stub(
    facts: &Manager<dyn Fact>,
    id: &str,
    input: &str,
) -> (Handle<dyn Fact>, Arc<AtomicUsize>) {
    insert_stub(facts, id, input, false)
}

pub fn add_failing_stub(
    facts: &Manager<dyn Fact>,
    id: &str,
    input: &str,
) -> (Handle<dyn Fact>, Arc<AtomicUsize>) {
    insert_stub(facts, id, input, true)
}

fn insert_stub(
    facts: &Manager<dyn Fact>,
    id: &str,
    input: &str,
    fail: bool,
) -> (Handle<dyn Fact>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stub = StubFact::new(id);
    stub.base.format = Some(Format::String);
    stub.base.input_name = input.to_string();
    stub.value = format!("{id}-data");
    stub.fail = fail;
    stub.calls = Arc::clone(&calls);

    let handle = facts.get_plugin("stub", id).unwrap();
    *handle.write() = Box::new(stub);
    (handle, calls)
}
