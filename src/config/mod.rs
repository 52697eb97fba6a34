use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::plugin::PluginConfigs;
use crate::result::Policy;

/// Top-level configuration, read from `factguard.yml` by default.
///
/// Each plugin section maps instance ids to a single-entry map of plugin
/// name to fields: `{id: {plugin-name: {...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connections: PluginConfigs,
    #[serde(default)]
    pub collect: PluginConfigs,
    #[serde(default)]
    pub analyse: PluginConfigs,
    #[serde(default)]
    pub output: PluginConfigs,
    #[serde(default)]
    pub policy: Policy,
}

/// Configuration file syntax, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "factguard.yml";

    /// Load config from a YAML or TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_yaml() -> &'static str {
        r#"# factguard configuration

collect:
  # Every fact is keyed by an id and names one fact plugin.
  php-version:
    command:
      cmd: php
      args: ["-r", "echo PHP_MAJOR_VERSION . '.' . PHP_MINOR_VERSION;"]
  compose-file:
    file:read:
      path: docker-compose.yml
  compose-images:
    yaml:key:
      input: compose-file
      path: services

analyse:
  php-supported:
    not:equals:
      description: PHP runs a supported version
      input: php-version
      key: stdout
      value: "8.3"
      severity: high
  allowed-images:
    allowed:list:
      description: Only approved images are used
      input: compose-images
      package-match: true
      allowed: ["mysql:8.0", "nginx"]
      severity: normal

output:
  stdout:
    table: {}

policy:
  # Minimum severity of a failing check that fails the run
  # (low, normal, high, critical).
  fail-on: normal
  # Analyser ids to ignore entirely.
  # ignore: ["php-supported"]
  # Per-analyser severity overrides.
  # overrides:
  #   allowed-images: low
"#
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::breach::Severity;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn starter_config_parses() {
        let config = Config::parse(Config::starter_yaml(), ConfigFormat::Yaml).unwrap();
        assert_eq!(config.collect.len(), 3);
        assert_eq!(config.analyse.len(), 2);
        assert!(config.analyse["allowed-images"].contains_key("allowed:list"));
        assert_eq!(config.policy.fail_on, Severity::Normal);
    }

    #[test]
    fn toml_is_selected_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[collect.hostname.command]\ncmd = \"hostname\"\n\n[policy]\nfail-on = \"critical\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.collect["hostname"].contains_key("command"));
        assert_eq!(config.policy.fail_on, Severity::Critical);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = Config::parse("collect: [", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, crate::error::Error::Yaml(_)));
    }
}
