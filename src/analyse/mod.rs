//! Analysers: checks evaluated against collected facts.
//!
//! Every analyser names exactly one input fact. The engine drives each
//! instance through the same lifecycle:
//!
//! 1. [`AnalyserBase::validate_input`] resolves and binds the input.
//! 2. [`Analyser::pre_process_input`] turns a missing or failed input into
//!    a breach and skips evaluation.
//! 3. [`Analyser::analyse`] runs the plugin's own logic.
//! 4. [`Analyser::result`] hands back the accumulated result.

/// Implement [`Plugin`] for an analyser holding its base in `self.base`.
macro_rules! analyser_plugin {
    ($ty:ty) => {
        impl $crate::plugin::Plugin for $ty {
            fn plugin_name(&self) -> &'static str {
                Self::NAME
            }

            fn plugin_base(&self) -> &$crate::plugin::PluginBase {
                &self.base.plugin
            }

            fn plugin_base_mut(&mut self) -> &mut $crate::plugin::PluginBase {
                &mut self.base.plugin
            }

            fn configure(&mut self, raw: serde_yaml::Value) -> $crate::error::Result<()> {
                $crate::plugin::decode_into(self, "analyser", raw)
            }
        }
    };
}

pub(crate) use analyser_plugin;

pub mod allowed;
pub mod equals;
pub mod not_empty;
pub mod regex_match;

use serde::Deserialize;

use crate::breach::template::{BreachSink, BreachTemplate, TemplateContext};
use crate::breach::{self, Breach, Severity};
use crate::error::Result;
use crate::fact::Fact;
use crate::plugin::{negotiate, Handle, Manager, Plugin, PluginBase, SupportKind, SupportLevel};
use crate::result::AnalysisResult;

pub use allowed::AllowedList;
pub use equals::{Equals, NotEquals};
pub use not_empty::NotEmpty;
pub use regex_match::{RegexMatch, RegexNotMatch};

/// Where an analyser is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyserState {
    #[default]
    Unvalidated,
    InputBound,
    Failed,
    Analysed,
}

/// Fields shared by every analyser, flattened into each plugin's config.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalyserBase {
    #[serde(skip)]
    pub plugin: PluginBase,
    pub description: String,
    #[serde(rename = "input")]
    pub input_name: String,
    pub severity: Severity,
    #[serde(rename = "breach-format")]
    pub breach_format: BreachTemplate,
    /// Raw remediator configuration, decoded when a breach is emitted.
    pub remediation: Option<serde_json::Value>,
    #[serde(skip)]
    input: Option<Handle<dyn Fact>>,
    #[serde(skip)]
    result: AnalysisResult,
    #[serde(skip)]
    state: AnalyserState,
}

impl AnalyserBase {
    pub fn new(id: &str) -> Self {
        Self {
            plugin: PluginBase::new(id),
            ..Default::default()
        }
    }

    pub fn state(&self) -> AnalyserState {
        self.state
    }

    pub fn input(&self) -> Option<&Handle<dyn Fact>> {
        self.input.as_ref()
    }

    /// Resolve the named input fact and bind it.
    ///
    /// The input is required; any format is accepted here and each
    /// analyser dispatches on the format itself.
    pub fn validate_input(&mut self, facts: &Manager<dyn Fact>) -> Result<()> {
        let id = self.plugin.id.clone();
        let bound = negotiate(
            &id,
            SupportKind::Input,
            SupportLevel::Required,
            &self.input_name,
            |name| facts.find_plugin(name),
            |_| Ok(()),
        );
        match bound {
            Ok(input) => {
                self.input = input;
                self.state = AnalyserState::InputBound;
                Ok(())
            }
            Err(e) => {
                tracing::debug!(analyser = %id, input = %self.input_name, error = %e, "input validation failed");
                self.state = AnalyserState::Failed;
                Err(e)
            }
        }
    }
}

/// An analyser plugin.
///
/// Implementors hold an [`AnalyserBase`] and provide [`Analyser::analyse`].
pub trait Analyser: Plugin {
    fn base(&self) -> &AnalyserBase;

    fn base_mut(&mut self) -> &mut AnalyserBase;

    /// Evaluate the bound input and emit breaches.
    fn analyse(&mut self, ctx: &TemplateContext<'_>);

    fn input_name(&self) -> &str {
        &self.base().input_name
    }

    fn severity(&self) -> Severity {
        self.base().severity
    }

    fn validate_input(&mut self, facts: &Manager<dyn Fact>) -> Result<()> {
        self.base_mut().validate_input(facts)
    }

    /// Check the bound input is usable; emits a breach and returns `false`
    /// when it is not.
    ///
    /// `input_failed` is set when the input was never collected because it
    /// or one of its ancestors failed.
    fn pre_process_input(&mut self, input_failed: bool) -> bool {
        let Some(input) = self.base().input().cloned() else {
            self.add_breach(Breach::new_value("", "no input available to analyse"));
            return false;
        };

        let mut errors: Vec<String> = input.read().errors().iter().map(ToString::to_string).collect();
        if errors.is_empty() && input_failed {
            errors.push(format!("{}: not collected, it or one of its inputs failed", self.input_name()));
        }
        if !errors.is_empty() {
            self.add_breach(Breach::key_values("", "input failure", "", errors));
            return false;
        }
        true
    }

    /// Mark the analyser as evaluated.
    fn finish(&mut self) {
        self.base_mut().state = AnalyserState::Analysed;
    }

    /// The accumulated result; its name is the description when one is set.
    fn result(&self) -> AnalysisResult {
        let base = self.base();
        let mut result = base.result.clone();
        result.id = self.id().to_string();
        result.name = if base.description.is_empty() {
            self.id().to_string()
        } else {
            base.description.clone()
        };
        result.check_type = self.plugin_name().to_string();
        result.severity = base.severity;
        result
    }

    fn breaches_mut(&mut self) -> &mut Vec<Breach> {
        &mut self.base_mut().result.breaches
    }

    /// Emit `raw` through the analyser's breach template.
    fn emit(&mut self, raw: Breach, ctx: &TemplateContext<'_>) {
        let remediation = self.base().remediation.clone();
        breach::template::evaluate_template(self, raw, remediation.as_ref(), ctx);
    }

    /// Emit `raw` without attaching a remediator.
    fn emit_plain(&mut self, raw: Breach, ctx: &TemplateContext<'_>) {
        breach::template::evaluate_template(self, raw, None, ctx);
    }

    /// Input data together with its format, read from the bound handle.
    fn input_data(&self) -> Option<crate::data::FactData> {
        self.base().input().map(|input| input.read().data().into_owned())
    }
}

impl<A: Analyser + ?Sized> BreachSink for A {
    fn breach_template(&self) -> &BreachTemplate {
        &self.base().breach_format
    }

    fn check_identity(&self) -> Option<(&str, &str, Severity)> {
        Some((self.plugin_name(), self.id(), self.base().severity))
    }

    fn add_breach(&mut self, mut breach: Breach) {
        let check_type = self.plugin_name();
        let check_name = self.id().to_string();
        let severity = self.base().severity;
        breach.set_common_values(check_type, &check_name, severity);
        self.breaches_mut().push(breach);
    }
}

/// Register every built-in analyser.
pub fn register_all(analysers: &Manager<dyn Analyser>) -> Result<()> {
    analysers.register_factory(Equals::NAME, |id| Box::new(Equals::new(id)))?;
    analysers.register_factory(NotEquals::NAME, |id| Box::new(NotEquals::new(id)))?;
    analysers.register_factory(NotEmpty::NAME, |id| Box::new(NotEmpty::new(id)))?;
    analysers.register_factory(AllowedList::NAME, |id| Box::new(AllowedList::new(id)))?;
    analysers.register_factory(RegexMatch::NAME, |id| Box::new(RegexMatch::new(id)))?;
    analysers.register_factory(RegexNotMatch::NAME, |id| Box::new(RegexNotMatch::new(id)))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::breach::template::BreachRenderer;
    use crate::data::FactData;
    use crate::error::Error;
    use crate::remediation::RemediatorRegistry;
    use crate::testing::fact_manager;

    /// Run one analyser end to end against a stub fact holding `data`.
    pub(crate) fn run_against<A: Analyser>(mut analyser: A, data: FactData) -> AnalysisResult {
        let facts = fact_manager();
        let fact = facts.get_plugin("stub", "input").unwrap();
        {
            let mut fact = fact.write();
            fact.base_mut().format = Some(data.format());
            fact.base_mut().set_data(data);
        }
        analyser.base_mut().input_name = "input".into();
        analyser.validate_input(&facts).unwrap();

        let renderer = BreachRenderer::default();
        let remediators = RemediatorRegistry::with_builtins();
        let ctx = TemplateContext {
            renderer: &renderer,
            remediators: &remediators,
        };
        if analyser.pre_process_input(false) {
            analyser.analyse(&ctx);
        }
        analyser.finish();
        analyser.result()
    }

    #[test]
    fn missing_input_name_fails_validation() {
        let facts = fact_manager();
        let mut analyser = Equals::new("check");
        let err = analyser.validate_input(&facts).unwrap_err();
        assert_eq!(
            err,
            Error::SupportRequired {
                plugin: "check".into(),
                kind: SupportKind::Input
            }
        );
        assert_eq!(analyser.base().state(), AnalyserState::Failed);
    }

    #[test]
    fn unknown_input_is_not_found() {
        let facts = fact_manager();
        let mut analyser = Equals::new("check");
        analyser.base_mut().input_name = "ghost".into();
        let err = analyser.validate_input(&facts).unwrap_err();
        assert_eq!(
            err,
            Error::SupportNotFound {
                plugin: "check".into(),
                kind: SupportKind::Input,
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn unbound_input_emits_breach() {
        let mut analyser = Equals::new("check");
        analyser.base_mut().severity = Severity::High;
        assert!(!analyser.pre_process_input(false));

        let breaches = analyser.result().breaches;
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].value(), "no input available to analyse");
        assert_eq!(breaches[0].check_type(), "equals");
        assert_eq!(breaches[0].check_name(), "check");
        assert_eq!(breaches[0].severity(), Severity::High);
    }

    #[test]
    fn failed_input_emits_input_failure_breach() {
        let facts = fact_manager();
        let fact = facts.get_plugin("stub", "input").unwrap();
        fact.write().add_errors(vec![Error::plugin("input", "boom")]);

        let mut analyser = NotEmpty::new("check");
        analyser.base_mut().input_name = "input".into();
        analyser.validate_input(&facts).unwrap();
        assert_eq!(analyser.base().state(), AnalyserState::InputBound);
        assert!(!analyser.pre_process_input(false));

        let breaches = analyser.result().breaches;
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].key(), "input failure");
        assert_eq!(breaches[0].values(), ["input: boom".to_string()]);
    }

    #[test]
    fn uncollected_input_emits_input_failure_breach() {
        let facts = fact_manager();
        facts.get_plugin("stub", "input").unwrap();

        let mut analyser = NotEmpty::new("check");
        analyser.base_mut().input_name = "input".into();
        analyser.validate_input(&facts).unwrap();
        assert!(!analyser.pre_process_input(true));

        let breaches = analyser.result().breaches;
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].key(), "input failure");
        assert_eq!(
            breaches[0].values(),
            ["input: not collected, it or one of its inputs failed".to_string()]
        );
    }

    #[test]
    fn result_name_defaults_to_description() {
        let mut analyser = Equals::new("check");
        assert_eq!(analyser.result().name, "check");
        analyser.base_mut().description = "Debug mode is off".into();
        assert_eq!(analyser.result().name, "Debug mode is off");
    }

    #[test]
    fn breach_template_applies_to_emitted_breaches() {
        let mut analyser = NotEmpty::new("check");
        analyser.base_mut().breach_format = serde_yaml::from_str(
            "type: value\nvalue: '{{ .Key }} has {{ .ValueLabel }}'\n",
        )
        .unwrap();
        let data = FactData::MapNestedString(
            [("web".to_string(), [("debug".to_string(), "on".to_string())].into())].into(),
        );
        let result = run_against(analyser, data);
        assert_eq!(result.breaches.len(), 1);
        assert_eq!(result.breaches[0].value(), "web has debug");
        assert_eq!(result.breaches[0].breach_type(), crate::breach::BreachType::Value);
    }

    #[test]
    fn templates_see_check_identity() {
        let mut analyser = NotEmpty::new("my-check");
        analyser.base_mut().severity = Severity::Critical;
        analyser.base_mut().breach_format = serde_yaml::from_str(
            "type: value\nvalue: '{{.CheckName}}/{{.Severity}}/{{.CheckType}}'\n",
        )
        .unwrap();
        let result = run_against(analyser, FactData::String("on".into()));
        assert_eq!(result.breaches.len(), 1);
        assert_eq!(result.breaches[0].value(), "my-check/critical/not:empty");
    }

    #[test]
    fn builtins_are_registered() {
        let analysers: Manager<dyn Analyser> = Manager::new("analyser");
        register_all(&analysers).unwrap();
        assert_eq!(
            analysers.list_plugins(),
            vec!["allowed:list", "equals", "not:empty", "not:equals", "regex:match", "regex:not-match"]
        );
    }
}
