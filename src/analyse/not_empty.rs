use serde::Deserialize;

use super::{analyser_plugin, Analyser, AnalyserBase};
use crate::breach::template::TemplateContext;
use crate::breach::Breach;
use crate::data::FactData;

/// Breaches once for every entry found in the input; an empty input passes.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotEmpty {
    #[serde(flatten)]
    base: AnalyserBase,
}

impl NotEmpty {
    pub const NAME: &'static str = "not:empty";

    pub fn new(id: &str) -> Self {
        Self {
            base: AnalyserBase::new(id),
        }
    }
}

analyser_plugin!(NotEmpty);

impl Analyser for NotEmpty {
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

        match data {
            FactData::Nil => {}
            FactData::String(s) => {
                if !s.is_empty() {
                    self.emit(Breach::new_value("", s), ctx);
                }
            }
            FactData::List(items) => {
                for item in items {
                    self.emit(Breach::new_value("", item), ctx);
                }
            }
            FactData::MapString(map) => {
                for (k, v) in map {
                    self.emit(Breach::key_value("", k, "", v), ctx);
                }
            }
            FactData::MapListString(map) => {
                for (k, values) in map {
                    self.emit(Breach::key_values("", k, "", values), ctx);
                }
            }
            FactData::MapNestedString(map) => {
                for (k, nested) in map {
                    for (sub_key, v) in nested {
                        self.emit(Breach::key_value("", k.clone(), sub_key, v), ctx);
                    }
                }
            }
            other => {
                let message = format!("unsupported input format {}", other.format());
                self.emit_plain(Breach::new_value("", message), ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::analyse::tests::run_against;
    use crate::breach::BreachType;

    #[test]
    fn empty_nested_map_passes() {
        let result = run_against(NotEmpty::new("no-debug"), FactData::MapNestedString(BTreeMap::new()));
        assert!(result.breaches.is_empty());
    }

    #[test]
    fn nested_entries_breach_with_sub_key_as_label() {
        let data = FactData::MapNestedString(BTreeMap::from([
            (
                "web".to_string(),
                BTreeMap::from([
                    ("debug".to_string(), "on".to_string()),
                    ("trace".to_string(), "1".to_string()),
                ]),
            ),
            (
                "worker".to_string(),
                BTreeMap::from([("debug".to_string(), "off".to_string())]),
            ),
        ]));
        let result = run_against(NotEmpty::new("no-debug"), data);

        let seen: Vec<(String, String, String)> = result
            .breaches
            .iter()
            .map(|b| (b.key().to_string(), b.value_label().to_string(), b.value().to_string()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("web".into(), "debug".into(), "on".into()),
                ("web".into(), "trace".into(), "1".into()),
                ("worker".into(), "debug".into(), "off".into()),
            ]
        );
        assert!(result.breaches.iter().all(|b| b.breach_type() == BreachType::KeyValue));
    }

    #[test]
    fn list_items_each_breach() {
        let data = FactData::List(vec!["a.sql".into(), "b.sql".into()]);
        let result = run_against(NotEmpty::new("no-dumps"), data);
        assert_eq!(result.breaches.len(), 2);
        assert_eq!(result.breaches[1].value(), "b.sql");
    }

    #[test]
    fn empty_string_passes_and_text_breaches() {
        let result = run_against(NotEmpty::new("quiet"), FactData::String(String::new()));
        assert!(result.breaches.is_empty());

        let result = run_against(NotEmpty::new("quiet"), FactData::String("warning".into()));
        assert_eq!(result.breaches.len(), 1);
    }

    #[test]
    fn raw_input_is_unsupported() {
        let result = run_against(NotEmpty::new("quiet"), FactData::Raw(b"x".to_vec()));
        assert_eq!(result.breaches.len(), 1);
        assert_eq!(result.breaches[0].value(), "unsupported input format raw");
    }
}
