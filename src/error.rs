use thiserror::Error;

use crate::plugin::SupportKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors are `Clone` so plugin-level failures can be copied into the
/// family-wide accumulators without losing the original record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{kind} required for '{plugin}'")]
    SupportRequired { plugin: String, kind: SupportKind },

    #[error("{kind} '{dependency}' not found for '{plugin}'")]
    SupportNotFound {
        plugin: String,
        kind: SupportKind,
        dependency: String,
    },

    #[error("{kind} '{dependency}' not supported for '{plugin}'")]
    SupportNone {
        plugin: String,
        kind: SupportKind,
        dependency: String,
    },

    #[error("plugin factory '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("plugin factory '{0}' not found in registry")]
    NotFound(String),

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("failed to decode {family} '{id}': {message}")]
    Decode {
        family: String,
        id: String,
        message: String,
    },

    #[error("{plugin}: {message}")]
    Plugin { plugin: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML parse error: {0}")]
    Toml(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Shorthand for a failure raised inside a plugin's own logic.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_messages_name_plugin_and_dependency() {
        let err = Error::SupportNotFound {
            plugin: "fact1".into(),
            kind: SupportKind::Connection,
            dependency: "db".into(),
        };
        assert_eq!(err.to_string(), "connection 'db' not found for 'fact1'");

        let err = Error::SupportRequired {
            plugin: "upstream".into(),
            kind: SupportKind::InputDataFormat,
        };
        assert_eq!(err.to_string(), "input data format required for 'upstream'");
    }

    #[test]
    fn cycle_message_lists_chain() {
        let err = Error::DependencyCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }
}
