//! Capability negotiation.
//!
//! Plugins describe their dependencies once, as a [`Capabilities`] value;
//! the routines here check that description against what the
//! configuration actually names and bind the resolved instances.

use serde::{Deserialize, Serialize};

use super::{Handle, Manager};
use crate::connection::Connection;
use crate::data::Format;
use crate::error::{Error, Result};
use crate::fact::Fact;

/// Whether a plugin needs, tolerates or refuses a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupportLevel {
    Required,
    Optional,
    #[default]
    #[serde(rename = "not-supported")]
    None,
}

impl std::fmt::Display for SupportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
            Self::None => write!(f, "not-supported"),
        }
    }
}

/// The kind of dependency being negotiated, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportKind {
    Connection,
    Input,
    InputDataFormat,
    AdditionalInput,
    AdditionalInputDataFormat,
}

impl std::fmt::Display for SupportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Input => write!(f, "input"),
            Self::InputDataFormat => write!(f, "input data format"),
            Self::AdditionalInput => write!(f, "additional input"),
            Self::AdditionalInputDataFormat => write!(f, "additional input data format"),
        }
    }
}

/// Declared support for one dependency kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability<T> {
    pub level: SupportLevel,
    pub allowed: Vec<T>,
}

impl<T: PartialEq> Capability<T> {
    pub fn none() -> Self {
        Self {
            level: SupportLevel::None,
            allowed: Vec::new(),
        }
    }

    pub fn optional(allowed: Vec<T>) -> Self {
        Self {
            level: SupportLevel::Optional,
            allowed,
        }
    }

    pub fn required(allowed: Vec<T>) -> Self {
        Self {
            level: SupportLevel::Required,
            allowed,
        }
    }

    pub fn allows(&self, candidate: &T) -> bool {
        self.allowed.contains(candidate)
    }
}

impl<T: PartialEq> Default for Capability<T> {
    fn default() -> Self {
        Self::none()
    }
}

/// What a fact plugin accepts as connection and primary input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Allowed connection plugin-type names.
    pub connections: Capability<&'static str>,
    /// Allowed formats of the primary input.
    pub inputs: Capability<Format>,
}

/// Negotiate a single dependency.
///
/// Checks run in a fixed order: nothing configured (success unless the
/// dependency is required), required but missing, unresolvable name, then
/// the caller's `check` on the resolved instance.
pub fn negotiate<H, R, C>(
    plugin: &str,
    kind: SupportKind,
    level: SupportLevel,
    configured: &str,
    resolve: R,
    check: C,
) -> Result<Option<H>>
where
    R: FnOnce(&str) -> Option<H>,
    C: FnOnce(&H) -> Result<()>,
{
    if configured.is_empty() {
        if level == SupportLevel::Required {
            return Err(Error::SupportRequired {
                plugin: plugin.to_string(),
                kind,
            });
        }
        return Ok(None);
    }

    let resolved = resolve(configured).ok_or_else(|| Error::SupportNotFound {
        plugin: plugin.to_string(),
        kind,
        dependency: configured.to_string(),
    })?;

    check(&resolved)?;
    Ok(Some(resolved))
}

/// Resolve and type-check a fact's connection.
pub fn negotiate_connection(
    plugin: &str,
    capability: &Capability<&'static str>,
    configured: &str,
    connections: &Manager<dyn Connection>,
) -> Result<Option<Handle<dyn Connection>>> {
    tracing::debug!(
        fact = plugin,
        connection_support = %capability.level,
        supported_connections = ?capability.allowed,
        "validating connection"
    );

    negotiate(
        plugin,
        SupportKind::Connection,
        capability.level,
        configured,
        |name| connections.find_plugin(name),
        |connection| {
            let connection_type = connection.read().plugin_name();
            if capability.allows(&connection_type) {
                Ok(())
            } else {
                Err(Error::SupportNone {
                    plugin: plugin.to_string(),
                    kind: SupportKind::Connection,
                    dependency: connection_type.to_string(),
                })
            }
        },
    )
}

/// Resolve and format-check a fact's primary input.
///
/// An input that has no format yet cannot be a source: that fails with
/// `SupportRequired` naming the upstream fact.
pub fn negotiate_input(
    plugin: &str,
    capability: &Capability<Format>,
    configured: &str,
    facts: &Manager<dyn Fact>,
) -> Result<Option<Handle<dyn Fact>>> {
    tracing::debug!(
        fact = plugin,
        input_support = %capability.level,
        supported_inputs = ?capability.allowed,
        "validating input"
    );

    negotiate(
        plugin,
        SupportKind::Input,
        capability.level,
        configured,
        |name| facts.find_plugin(name),
        |input| {
            let input = input.read();
            let Some(format) = input.format() else {
                return Err(Error::SupportRequired {
                    plugin: input.id().to_string(),
                    kind: SupportKind::InputDataFormat,
                });
            };
            tracing::debug!(fact = plugin, input = input.id(), input_format = %format, "found input plugin");
            if capability.allows(&format) {
                Ok(())
            } else {
                Err(Error::SupportNone {
                    plugin: plugin.to_string(),
                    kind: SupportKind::Input,
                    dependency: format!("{} ({})", input.id(), format),
                })
            }
        },
    )
}

/// Resolve every additional input; each must exist and carry a format.
/// All failures are returned together.
pub fn resolve_additional_inputs(
    plugin: &str,
    names: &[String],
    facts: &Manager<dyn Fact>,
) -> std::result::Result<Vec<Handle<dyn Fact>>, Vec<Error>> {
    tracing::debug!(fact = plugin, "loading additional inputs");

    let mut resolved = Vec::new();
    let mut errors = Vec::new();
    for name in names {
        let Some(input) = facts.find_plugin(name) else {
            errors.push(Error::SupportNotFound {
                plugin: plugin.to_string(),
                kind: SupportKind::AdditionalInput,
                dependency: name.clone(),
            });
            continue;
        };
        if input.read().format().is_none() {
            errors.push(Error::SupportRequired {
                plugin: name.clone(),
                kind: SupportKind::AdditionalInputDataFormat,
            });
            continue;
        }
        resolved.push(input);
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}
