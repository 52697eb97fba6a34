//! Breaches: structured descriptions of detected policy violations.

pub mod template;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::remediation::{RemediationResult, RemediationStatus, Remediator};

pub use template::{
    evaluate_template, BreachRenderer, BreachSink, BreachTemplate, TemplateContext, TemplateFunc,
    TemplateFuncs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" | "medium" | "med" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreachType {
    Value,
    KeyValue,
    KeyValues,
}

impl std::fmt::Display for BreachType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::KeyValue => write!(f, "key-value"),
            Self::KeyValues => write!(f, "key-values"),
        }
    }
}

/// The four text fields a breach template can rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreachFields {
    pub key_label: String,
    pub key: String,
    pub value_label: String,
    pub value: String,
}

impl BreachType {
    /// Build a breach of this type from rendered fields.
    ///
    /// Common values and the expected value carry over from `source`. A
    /// key-values breach keeps the source's values, or holds the rendered
    /// value alone when the source has none.
    pub fn reconstruct(self, fields: BreachFields, source: &Breach) -> Breach {
        let common = source.common().clone();
        let BreachFields {
            key_label,
            key,
            value_label,
            value,
        } = fields;
        match self {
            Self::Value => Breach::Value(ValueBreach {
                common,
                value_label,
                value,
                expected_value: source.expected_value().to_string(),
            }),
            Self::KeyValue => Breach::KeyValue(KeyValueBreach {
                common,
                key_label,
                key,
                value_label,
                value,
                expected_value: source.expected_value().to_string(),
            }),
            Self::KeyValues => {
                let values = match source.values() {
                    [] => vec![value],
                    values => values.to_vec(),
                };
                Breach::KeyValues(KeyValuesBreach {
                    common,
                    key_label,
                    key,
                    value_label,
                    values,
                })
            }
        }
    }
}

/// Fields every breach variant carries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BreachCommon {
    #[serde(rename = "check-type")]
    pub check_type: String,
    #[serde(rename = "check-name")]
    pub check_name: String,
    pub severity: Severity,
    #[serde(skip)]
    pub remediator: Option<Arc<dyn Remediator>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationResult>,
}

impl PartialEq for BreachCommon {
    fn eq(&self, other: &Self) -> bool {
        self.check_type == other.check_type
            && self.check_name == other.check_name
            && self.severity == other.severity
            && self.remediation == other.remediation
    }
}

/// A breach with a value and no key, e.g. `[file] foo.ext not found`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueBreach {
    #[serde(flatten)]
    pub common: BreachCommon,
    #[serde(rename = "value-label", skip_serializing_if = "String::is_empty")]
    pub value_label: String,
    pub value: String,
    #[serde(rename = "expected-value", skip_serializing_if = "String::is_empty")]
    pub expected_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyValueBreach {
    #[serde(flatten)]
    pub common: BreachCommon,
    #[serde(rename = "key-label", skip_serializing_if = "String::is_empty")]
    pub key_label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(rename = "value-label", skip_serializing_if = "String::is_empty")]
    pub value_label: String,
    pub value: String,
    #[serde(rename = "expected-value", skip_serializing_if = "String::is_empty")]
    pub expected_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyValuesBreach {
    #[serde(flatten)]
    pub common: BreachCommon,
    #[serde(rename = "key-label", skip_serializing_if = "String::is_empty")]
    pub key_label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(rename = "value-label", skip_serializing_if = "String::is_empty")]
    pub value_label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "breach-type", rename_all = "kebab-case")]
pub enum Breach {
    Value(ValueBreach),
    KeyValue(KeyValueBreach),
    KeyValues(KeyValuesBreach),
}

impl Breach {
    pub fn new_value(value_label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Value(ValueBreach {
            value_label: value_label.into(),
            value: value.into(),
            ..Default::default()
        })
    }

    pub fn key_value(
        key_label: impl Into<String>,
        key: impl Into<String>,
        value_label: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::KeyValue(KeyValueBreach {
            key_label: key_label.into(),
            key: key.into(),
            value_label: value_label.into(),
            value: value.into(),
            ..Default::default()
        })
    }

    pub fn key_values(
        key_label: impl Into<String>,
        key: impl Into<String>,
        value_label: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self::KeyValues(KeyValuesBreach {
            key_label: key_label.into(),
            key: key.into(),
            value_label: value_label.into(),
            values,
            ..Default::default()
        })
    }

    /// Set the expected value; no-op on key-values breaches.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        match &mut self {
            Self::Value(b) => b.expected_value = expected.into(),
            Self::KeyValue(b) => b.expected_value = expected.into(),
            Self::KeyValues(_) => {}
        }
        self
    }

    pub fn breach_type(&self) -> BreachType {
        match self {
            Self::Value(_) => BreachType::Value,
            Self::KeyValue(_) => BreachType::KeyValue,
            Self::KeyValues(_) => BreachType::KeyValues,
        }
    }

    pub fn common(&self) -> &BreachCommon {
        match self {
            Self::Value(b) => &b.common,
            Self::KeyValue(b) => &b.common,
            Self::KeyValues(b) => &b.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut BreachCommon {
        match self {
            Self::Value(b) => &mut b.common,
            Self::KeyValue(b) => &mut b.common,
            Self::KeyValues(b) => &mut b.common,
        }
    }

    pub fn set_common_values(&mut self, check_type: &str, check_name: &str, severity: Severity) {
        let common = self.common_mut();
        common.check_type = check_type.to_string();
        common.check_name = check_name.to_string();
        common.severity = severity;
    }

    pub fn check_type(&self) -> &str {
        &self.common().check_type
    }

    pub fn check_name(&self) -> &str {
        &self.common().check_name
    }

    pub fn severity(&self) -> Severity {
        self.common().severity
    }

    pub fn key_label(&self) -> &str {
        match self {
            Self::Value(_) => "",
            Self::KeyValue(b) => &b.key_label,
            Self::KeyValues(b) => &b.key_label,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Value(_) => "",
            Self::KeyValue(b) => &b.key,
            Self::KeyValues(b) => &b.key,
        }
    }

    pub fn value_label(&self) -> &str {
        match self {
            Self::Value(b) => &b.value_label,
            Self::KeyValue(b) => &b.value_label,
            Self::KeyValues(b) => &b.value_label,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Value(b) => &b.value,
            Self::KeyValue(b) => &b.value,
            Self::KeyValues(_) => "",
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            Self::KeyValues(b) => &b.values,
            _ => &[],
        }
    }

    pub fn expected_value(&self) -> &str {
        match self {
            Self::Value(b) => &b.expected_value,
            Self::KeyValue(b) => &b.expected_value,
            Self::KeyValues(_) => "",
        }
    }

    pub fn fields(&self) -> BreachFields {
        BreachFields {
            key_label: self.key_label().to_string(),
            key: self.key().to_string(),
            value_label: self.value_label().to_string(),
            value: self.value().to_string(),
        }
    }

    pub fn remediator(&self) -> Option<&Arc<dyn Remediator>> {
        self.common().remediator.as_ref()
    }

    pub fn set_remediator(&mut self, remediator: Option<Arc<dyn Remediator>>) {
        self.common_mut().remediator = remediator;
    }

    pub fn remediation(&self) -> Option<&RemediationResult> {
        self.common().remediation.as_ref()
    }

    pub fn set_remediation(&mut self, status: RemediationStatus, message: impl Into<String>) {
        self.common_mut().remediation = Some(RemediationResult::new(status, message));
    }

    /// Run the attached remediator, or record `no-support` when there is none.
    pub fn perform_remediation(&mut self) {
        let result = match self.remediator() {
            Some(remediator) => {
                tracing::debug!(check = %self.check_name(), remediator = remediator.plugin_name(), "performing remediation");
                remediator.remediate()
            }
            None => RemediationResult::new(RemediationStatus::NoSupport, "no remediation configured"),
        };
        self.common_mut().remediation = Some(result);
    }
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const INDENT: &str = "\n        - ";
        match self {
            Self::Value(b) if b.value_label.is_empty() => write!(f, "{}", b.value),
            Self::Value(b) => write!(f, "[{}] {}", b.value_label, b.value),
            Self::KeyValue(b) if !b.expected_value.is_empty() => write!(
                f,
                "[{}] '{}' equals '{}', expected '{}'",
                b.key_label, b.key, b.value, b.expected_value
            ),
            Self::KeyValue(b) => {
                write!(f, "[{}:{}] {}: {}", b.key_label, b.key, b.value_label, b.value)
            }
            Self::KeyValues(b) if !b.key_label.is_empty() && !b.value_label.is_empty() => write!(
                f,
                "[{}:{}] {}:{}{}",
                b.key_label,
                b.key,
                b.value_label,
                INDENT,
                b.values.join(INDENT)
            ),
            Self::KeyValues(b) => write!(f, "{}:{}{}", b.key, INDENT, b.values.join(INDENT)),
        }
    }
}
