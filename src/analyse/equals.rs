use serde::Deserialize;

use super::{analyser_plugin, Analyser, AnalyserBase};
use crate::breach::template::TemplateContext;
use crate::breach::Breach;
use crate::data::FactData;

/// Breaches when the input equals `value`.
///
/// String inputs are compared directly; map-string inputs compare the
/// entry under `key`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Equals {
    #[serde(flatten)]
    base: AnalyserBase,
    pub value: String,
    pub key: String,
}

impl Equals {
    pub const NAME: &'static str = "equals";

    pub fn new(id: &str) -> Self {
        Self {
            base: AnalyserBase::new(id),
            ..Default::default()
        }
    }
}

analyser_plugin!(Equals);

impl Analyser for Equals {
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
        tracing::debug!(analyser = %self.base.plugin.id, input = %self.base.input_name, input_format = %data.format(), "analysing");

        let actual = match &data {
            FactData::String(s) => s.clone(),
            FactData::MapString(m) => m.get(&self.key).cloned().unwrap_or_default(),
            other => {
                tracing::error!(input_format = %other.format(), "unsupported input format");
                return;
            }
        };
        if actual == self.value {
            let message = format!("{} equals '{}'", self.base.input_name, actual);
            self.emit(Breach::new_value("", message), ctx);
        }
    }
}

/// Breaches when the input differs from `value`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotEquals {
    #[serde(flatten)]
    base: AnalyserBase,
    pub value: String,
    pub key: String,
}

impl NotEquals {
    pub const NAME: &'static str = "not:equals";

    pub fn new(id: &str) -> Self {
        Self {
            base: AnalyserBase::new(id),
            ..Default::default()
        }
    }
}

analyser_plugin!(NotEquals);

impl Analyser for NotEquals {
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
        tracing::debug!(analyser = %self.base.plugin.id, input = %self.base.input_name, input_format = %data.format(), "analysing");

        let actual = match &data {
            FactData::String(s) => s.clone(),
            FactData::MapString(m) => m.get(&self.key).cloned().unwrap_or_default(),
            other => {
                tracing::error!(input_format = %other.format(), "unsupported input format");
                return;
            }
        };
        if actual != self.value {
            let message = format!("{} does not equal '{}'", self.base.input_name, self.value);
            self.emit(Breach::new_value("", message).with_expected(self.value.clone()), ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::analyse::tests::run_against;

    fn equals(value: &str, key: &str) -> Equals {
        let mut analyser = Equals::new("debug-off");
        analyser.value = value.into();
        analyser.key = key.into();
        analyser
    }

    fn settings() -> FactData {
        FactData::MapString(BTreeMap::from([
            ("debug".to_string(), "true".to_string()),
            ("env".to_string(), "prod".to_string()),
        ]))
    }

    #[test]
    fn equal_string_breaches() {
        let result = run_against(equals("true", ""), FactData::String("true".into()));
        assert_eq!(result.breaches.len(), 1);
        assert_eq!(result.breaches[0].value(), "input equals 'true'");
    }

    #[test]
    fn different_string_passes() {
        let result = run_against(equals("true", ""), FactData::String("false".into()));
        assert!(result.breaches.is_empty());
    }

    #[test]
    fn map_string_compares_the_keyed_entry() {
        let result = run_against(equals("true", "debug"), settings());
        assert_eq!(result.breaches.len(), 1);

        let result = run_against(equals("true", "env"), settings());
        assert!(result.breaches.is_empty());
    }

    #[test]
    fn unsupported_format_emits_nothing() {
        let result = run_against(equals("a", ""), FactData::List(vec!["a".into()]));
        assert!(result.breaches.is_empty());
    }

    #[test]
    fn not_equals_reports_expected_value() {
        let mut analyser = NotEquals::new("env-prod");
        analyser.value = "prod".into();
        analyser.key = "env".into();
        let result = run_against(analyser, settings());
        assert!(result.breaches.is_empty());

        let mut analyser = NotEquals::new("env-stage");
        analyser.value = "stage".into();
        analyser.key = "env".into();
        let result = run_against(analyser, settings());
        assert_eq!(result.breaches.len(), 1);
        assert_eq!(result.breaches[0].value(), "input does not equal 'stage'");
        assert_eq!(result.breaches[0].expected_value(), "stage");
        assert_eq!(result.breaches[0].check_type(), "not:equals");
    }
}
