use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::Deserialize;

use super::{analyser_plugin, Analyser, AnalyserBase};
use crate::breach::template::TemplateContext;
use crate::breach::Breach;
use crate::data::FactData;

/// Splits `name[:@]version` package references.
static PACKAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:@]+)(?:[:@](.+))?$").unwrap());

/// Breaches on values missing from the allow list or present in the
/// deprecated list.
///
/// With `package-match` set, values and allow-list entries are treated as
/// package references: an entry with a version is a minimum version.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AllowedList {
    #[serde(flatten)]
    base: AnalyserBase,
    #[serde(rename = "package-match")]
    pub package_match: bool,
    pub allowed: Vec<String>,
    pub deprecated: Vec<String>,
    #[serde(rename = "exclude-keys")]
    pub exclude_keys: Vec<String>,
    pub ignore: Vec<String>,
}

impl AllowedList {
    pub const NAME: &'static str = "allowed:list";

    pub fn new(id: &str) -> Self {
        Self {
            base: AnalyserBase::new(id),
            ..Default::default()
        }
    }

    fn is_allowed(&self, value: &str) -> bool {
        if !self.package_match {
            return self.allowed.iter().any(|a| a == value);
        }
        let Some((name, version)) = split_package(value) else {
            return false;
        };
        self.allowed.iter().any(|entry| package_satisfies(entry, name, version))
    }

    fn is_deprecated(&self, value: &str) -> bool {
        self.deprecated.iter().any(|d| d == value)
    }

    fn is_excluded_key(&self, key: &str) -> bool {
        self.exclude_keys.iter().any(|e| e == key)
    }

    fn is_ignored(&self, value: &str) -> bool {
        self.ignore.iter().any(|i| i == value)
    }

    /// The breach for one value, if any.
    fn check(&self, key: &str, value: &str) -> Option<Breach> {
        if self.is_ignored(value) {
            return None;
        }
        if !self.is_allowed(value) {
            return Some(Breach::key_value("key", key, "disallowed", value));
        }
        if self.is_deprecated(value) {
            return Some(Breach::key_value("key", key, "deprecated", value));
        }
        None
    }
}

/// Name and version of a package reference; a `latest` tag yields an empty
/// version.
fn split_package(value: &str) -> Option<(&str, &str)> {
    let caps = PACKAGE.captures(value)?;
    let name = caps.get(1).map_or("", |m| m.as_str());
    let version = match caps.get(2).map_or("", |m| m.as_str()) {
        "latest" => "",
        version => version,
    };
    Some((name, version))
}

/// Parse loosely: `8`, `8.0` and `v8.0.1` are all accepted. A variant
/// suffix such as `-alpine` on a short version is dropped.
fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let raw = raw.split_once('-').map_or(raw, |(core, _)| core);
    let mut parts = [0u64; 3];
    let mut count = 0;
    for (slot, part) in parts.iter_mut().zip(raw.split('.')) {
        *slot = part.parse().ok()?;
        count += 1;
    }
    if count == 0 || raw.split('.').count() > 3 {
        return None;
    }
    Some(Version::new(parts[0], parts[1], parts[2]))
}

/// Whether the allow-list `entry` admits package `name` at `version`.
fn package_satisfies(entry: &str, name: &str, version: &str) -> bool {
    let Some((allowed_name, allowed_version)) = split_package(entry) else {
        return false;
    };
    if allowed_name.is_empty() || name.is_empty() || allowed_name != name {
        return false;
    }
    if allowed_version.is_empty() {
        return true;
    }
    if version.is_empty() {
        return false;
    }
    match (parse_version(allowed_version), parse_version(version)) {
        (Some(minimum), Some(actual)) => minimum <= actual,
        _ => false,
    }
}

analyser_plugin!(AllowedList);

impl Analyser for AllowedList {
    fn base(&self) -> &AnalyserBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AnalyserBase {
        &mut self.base
    }

    fn analyse(&mut self, ctx: &TemplateContext<'_>) {
        let Some(data) = self.input_data() else {
            return;
        };

        let mut breaches = Vec::new();
        match data {
            FactData::Nil => {}
            FactData::List(values) => {
                breaches.extend(values.iter().filter_map(|v| self.check("", v)));
            }
            FactData::MapString(map) => {
                for (k, v) in &map {
                    if self.is_excluded_key(k) {
                        continue;
                    }
                    breaches.extend(self.check(k, v));
                }
            }
            FactData::MapListString(map) => {
                for (k, values) in &map {
                    if self.is_excluded_key(k) || self.is_ignored(k) {
                        continue;
                    }
                    breaches.extend(values.iter().filter_map(|v| self.check(k, v)));
                }
            }
            other => {
                let message = format!("unsupported input format {}", other.format());
                self.emit_plain(Breach::new_value("", message), ctx);
            }
        }

        for breach in breaches {
            self.emit(breach, ctx);
        }
    }
}
