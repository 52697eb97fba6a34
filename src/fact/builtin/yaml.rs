use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

use super::fact_plugin;
use crate::data::{FactData, Format};
use crate::error::Error;
use crate::fact::{input_data, Fact, FactBase};
use crate::plugin::{Capabilities, Capability, Plugin};

/// Looks up a dotted key path in YAML documents read by `file:read` (raw)
/// or `file:lookup` (map-bytes).
///
/// The output format follows what the path points at and is only known
/// after collection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct YamlKey {
    #[serde(flatten)]
    base: FactBase,
    pub path: String,
    /// Return only the keys of the mapping found at the path.
    #[serde(rename = "keys-only")]
    pub keys_only: bool,
    /// Produce a `nil` fact instead of an error when the path is absent.
    #[serde(rename = "ignore-not-found")]
    pub ignore_not_found: bool,
}

impl YamlKey {
    pub const NAME: &'static str = "yaml:key";

    pub fn new(id: &str) -> Self {
        Self {
            base: FactBase::new(id),
            ..Default::default()
        }
    }

    fn lookup_document(&self, source: &str, bytes: &[u8]) -> Result<Option<FactData>, String> {
        let doc: Value = serde_yaml::from_slice(bytes).map_err(|e| format!("{source}: {e}"))?;
        let Some(node) = lookup(&doc, &self.path) else {
            return Ok(None);
        };
        if self.keys_only {
            let Value::Mapping(mapping) = node else {
                return Err("keys-only lookup only supports a mapping".to_string());
            };
            let keys = mapping.keys().filter_map(scalar_string).collect();
            return Ok(Some(FactData::List(keys)));
        }
        node_data(node).map(Some)
    }

    fn not_found(&self, source: &str) -> String {
        format!("path '{}' not found in {}", self.path, source)
    }
}

fact_plugin!(YamlKey, None);

impl Fact for YamlKey {
    fn base(&self) -> &FactBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FactBase {
        &mut self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            connections: Capability::none(),
            inputs: Capability::required(vec![Format::Raw, Format::MapBytes]),
        }
    }

    fn collect(&mut self) {
        let Some(input) = input_data(&self.base) else {
            return;
        };
        tracing::debug!(fact = %self.id(), input_format = %input.format(), path = %self.path, "collecting data");

        let outcome = match &input {
            FactData::Raw(bytes) => self.collect_single(bytes),
            FactData::MapBytes(files) => self.collect_files(files),
            other => Err(vec![format!("unsupported input format {}", other.format())]),
        };

        match outcome {
            Ok(data) => {
                self.base.format = Some(data.format());
                self.base.set_data(data);
            }
            Err(messages) => {
                let id = self.id().to_string();
                for message in &messages {
                    tracing::error!(fact = %id, error = %message, "error looking up yaml path");
                }
                self.add_errors(messages.into_iter().map(|m| Error::plugin(&id, m)).collect());
            }
        }
    }
}

impl YamlKey {
    fn collect_single(&self, bytes: &[u8]) -> Result<FactData, Vec<String>> {
        match self.lookup_document("input", bytes).map_err(|e| vec![e])? {
            Some(data) => Ok(data),
            None if self.ignore_not_found => Ok(FactData::Nil),
            None => Err(vec![self.not_found("input")]),
        }
    }

    /// Per-file lookups, combined into one map keyed by file.
    fn collect_files(&self, files: &BTreeMap<String, Vec<u8>>) -> Result<FactData, Vec<String>> {
        let mut found = BTreeMap::new();
        let mut errors = Vec::new();
        for (file, bytes) in files {
            match self.lookup_document(file, bytes) {
                Ok(Some(data)) => {
                    found.insert(file.clone(), data);
                }
                Ok(None) if self.ignore_not_found => {}
                Ok(None) => errors.push(self.not_found(file)),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        if found.is_empty() {
            return Ok(FactData::Nil);
        }
        combine(found).map_err(|e| vec![e])
    }
}

/// Follow a dotted path; numeric segments index sequences.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(doc, |node, segment| match node {
            Value::Mapping(mapping) => mapping.get(segment),
            Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn scalar_list(items: &[Value]) -> Option<Vec<String>> {
    items.iter().map(scalar_string).collect()
}

fn scalar_map(mapping: &serde_yaml::Mapping) -> Option<BTreeMap<String, String>> {
    mapping
        .iter()
        .map(|(k, v)| Some((scalar_string(k)?, scalar_string(v)?)))
        .collect()
}

fn node_data(node: &Value) -> Result<FactData, String> {
    if let Some(s) = scalar_string(node) {
        return Ok(FactData::String(s));
    }
    match node {
        Value::Sequence(items) => scalar_list(items)
            .map(FactData::List)
            .ok_or_else(|| "sequence contains non-scalar values".to_string()),
        Value::Mapping(mapping) => {
            if let Some(flat) = scalar_map(mapping) {
                return Ok(FactData::MapString(flat));
            }
            let mut lists = BTreeMap::new();
            let mut nested = BTreeMap::new();
            for (k, v) in mapping {
                let key = scalar_string(k).ok_or_else(|| "non-scalar mapping key".to_string())?;
                match v {
                    Value::Sequence(items) => {
                        let list = scalar_list(items).ok_or("unsupported nested sequence")?;
                        lists.insert(key, list);
                    }
                    Value::Mapping(inner) => {
                        let map = scalar_map(inner).ok_or("mapping nested too deeply")?;
                        nested.insert(key, map);
                    }
                    _ => return Err("mapping mixes scalar and collection values".to_string()),
                }
            }
            match (lists.is_empty(), nested.is_empty()) {
                (false, true) => Ok(FactData::MapListString(lists)),
                (true, false) => Ok(FactData::MapNestedString(nested)),
                _ => Err("mapping mixes sequence and mapping values".to_string()),
            }
        }
        _ => Err("unsupported yaml value".to_string()),
    }
}

fn combine(found: BTreeMap<String, FactData>) -> Result<FactData, String> {
    let mut strings = BTreeMap::new();
    let mut lists = BTreeMap::new();
    let mut maps = BTreeMap::new();
    for (file, data) in found {
        match data {
            FactData::String(s) => {
                strings.insert(file, s);
            }
            FactData::List(l) => {
                lists.insert(file, l);
            }
            FactData::MapString(m) => {
                maps.insert(file, m);
            }
            other => {
                return Err(format!("unsupported format {} for nested lookup", other.format()));
            }
        }
    }
    match (strings.is_empty(), lists.is_empty(), maps.is_empty()) {
        (false, true, true) => Ok(FactData::MapString(strings)),
        (true, false, true) => Ok(FactData::MapListString(lists)),
        (true, true, false) => Ok(FactData::MapNestedString(maps)),
        _ => Err("files resolve the path to different shapes".to_string()),
    }
}
