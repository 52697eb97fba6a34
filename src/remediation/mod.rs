//! Remediators: actions attached to a breach that try to fix it.

mod command;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use command::CommandRemediator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationStatus {
    #[default]
    NoSupport,
    Success,
    Failed,
    Partial,
}

impl std::fmt::Display for RemediationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSupport => write!(f, "no-support"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub status: RemediationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl RemediationResult {
    pub fn new(status: RemediationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            messages: vec![message.into()],
        }
    }
}

pub trait Remediator: std::fmt::Debug + Send + Sync {
    fn plugin_name(&self) -> &'static str;

    /// Human-readable description of what the remediation does.
    fn message(&self) -> &str;

    fn remediate(&self) -> RemediationResult;
}

type RemediatorFactory = Arc<dyn Fn(serde_json::Value) -> Result<Arc<dyn Remediator>> + Send + Sync>;

/// Builds remediators from an analyser's `remediation` configuration.
///
/// The `plugin` field selects the remediator and defaults to `command`.
#[derive(Clone, Default)]
pub struct RemediatorRegistry {
    factories: BTreeMap<String, RemediatorFactory>,
}

impl std::fmt::Debug for RemediatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediatorRegistry")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RemediatorRegistry {
    pub const DEFAULT_PLUGIN: &'static str = "command";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            CommandRemediator::NAME.to_string(),
            Arc::new(|raw: serde_json::Value| -> Result<Arc<dyn Remediator>> {
                let remediator: CommandRemediator = serde_json::from_value(raw)?;
                Ok(Arc::new(remediator))
            }),
        );
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(serde_json::Value) -> Result<Arc<dyn Remediator>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(Error::AlreadyRegistered(name.to_string()));
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Decode a remediator from raw configuration.
    pub fn build(&self, raw: &serde_json::Value) -> Result<Arc<dyn Remediator>> {
        let plugin = raw
            .get("plugin")
            .and_then(serde_json::Value::as_str)
            .filter(|p| !p.is_empty())
            .unwrap_or(Self::DEFAULT_PLUGIN);
        tracing::debug!(plugin, "parsing remediator");

        let factory = self
            .factories
            .get(plugin)
            .ok_or_else(|| Error::NotFound(plugin.to_string()))?;
        factory(raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plugin_defaults_to_command() {
        let registry = RemediatorRegistry::with_builtins();
        let remediator = registry
            .build(&json!({"cmd": "true", "msg": "reset permissions"}))
            .unwrap();
        assert_eq!(remediator.plugin_name(), "command");
        assert_eq!(remediator.message(), "reset permissions");
    }

    #[test]
    fn unknown_plugin_is_not_found() {
        let registry = RemediatorRegistry::with_builtins();
        let err = registry.build(&json!({"plugin": "ansible"})).unwrap_err();
        assert_eq!(err, Error::NotFound("ansible".into()));
    }

    #[test]
    fn malformed_fields_are_decode_errors() {
        let registry = RemediatorRegistry::with_builtins();
        let err = registry.build(&json!({"cmd": 42})).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = RemediatorRegistry::with_builtins();
        let err = registry
            .register("command", |_| Err(Error::Config("unused".into())))
            .unwrap_err();
        assert_eq!(err, Error::AlreadyRegistered("command".into()));
        assert_eq!(registry.list(), vec!["command"]);
    }
}
