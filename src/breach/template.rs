//! Breach templates: per-analyser configuration that rewrites the text of
//! emitted breaches.
//!
//! Templates are handlebars strings rendered against the raw breach. The
//! Go-template spelling with a leading dot (`{{.Value}}`) is accepted as
//! well, so existing check definitions keep working.

use std::collections::BTreeMap;
use std::sync::Arc;

use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson, Template,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Breach, BreachType, Severity};
use crate::fact::Fact;
use crate::plugin::Manager;
use crate::remediation::{Remediator, RemediatorRegistry};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreachTemplate {
    /// Breach type to emit; `None` passes breaches through unchanged.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub breach_type: Option<BreachType>,
    #[serde(rename = "key-label", skip_serializing_if = "String::is_empty")]
    pub key_label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(rename = "value-label", skip_serializing_if = "String::is_empty")]
    pub value_label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
}

/// A function callable from templates; receives the helper's parameters.
pub type TemplateFunc = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

pub type TemplateFuncs = BTreeMap<String, TemplateFunc>;

/// Something that owns a breach template and accepts breaches.
pub trait BreachSink {
    fn breach_template(&self) -> &BreachTemplate;

    /// Check type, check name and severity stamped on breaches before
    /// their template is rendered.
    fn check_identity(&self) -> Option<(&str, &str, Severity)> {
        None
    }

    fn add_breach(&mut self, breach: Breach);
}

/// What went wrong while rendering one template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateFailure {
    Parse(String),
    Render(String),
}

impl TemplateFailure {
    fn into_breach(self) -> Breach {
        match self {
            Self::Parse(e) => Breach::new_value("unable to parse breach template", e),
            Self::Render(e) => Breach::new_value("unable to render breach template", e),
        }
    }
}

struct FuncHelper(TemplateFunc);

impl HelperDef for FuncHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        (self.0)(&args)
            .map(ScopedJson::Derived)
            .map_err(|e| RenderErrorReason::Other(e).into())
    }
}

static TEMPLATE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^}]*\}\}").unwrap());

static LEADING_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[\s({])\.([A-Za-z])").unwrap());

/// Rewrite `{{.Field}}` references into handlebars paths.
fn normalise(template: &str) -> String {
    TEMPLATE_BLOCK
        .replace_all(template, |caps: &regex::Captures| {
            LEADING_DOT.replace_all(&caps[0], "$1$2").into_owned()
        })
        .into_owned()
}

/// Renders template strings with the registered functions available as
/// helpers.
pub struct BreachRenderer {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for BreachRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreachRenderer").finish_non_exhaustive()
    }
}

impl Default for BreachRenderer {
    fn default() -> Self {
        Self::new(&TemplateFuncs::new())
    }
}

impl BreachRenderer {
    pub fn new(funcs: &TemplateFuncs) -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::no_escape);
        for (name, func) in funcs {
            registry.register_helper(name, Box::new(FuncHelper(Arc::clone(func))));
        }
        Self { registry }
    }

    pub fn render(&self, template: &str, data: &Value) -> Result<String, TemplateFailure> {
        let template = normalise(template);
        Template::compile(&template).map_err(|e| TemplateFailure::Parse(e.to_string()))?;
        self.registry
            .render_template(&template, data)
            .map_err(|e| TemplateFailure::Render(e.to_string()))
    }
}

/// Shared state needed to turn raw breaches into emitted ones.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub renderer: &'a BreachRenderer,
    pub remediators: &'a RemediatorRegistry,
}

/// The data a template string is rendered against.
fn render_data(breach: &Breach) -> Value {
    let fields = json!({
        "BreachType": breach.breach_type().to_string(),
        "CheckType": breach.check_type(),
        "CheckName": breach.check_name(),
        "Severity": breach.severity().to_string(),
        "KeyLabel": breach.key_label(),
        "Key": breach.key(),
        "ValueLabel": breach.value_label(),
        "Value": breach.value(),
        "Values": breach.values(),
        "ExpectedValue": breach.expected_value(),
    });
    let mut data = fields.clone();
    if let Value::Object(map) = &mut data {
        map.insert("Breach".to_string(), fields);
    }
    data
}

fn resolve_remediator<S: BreachSink + ?Sized>(
    sink: &mut S,
    remediation: Option<&Value>,
    ctx: &TemplateContext<'_>,
) -> Option<Arc<dyn Remediator>> {
    let raw = remediation.filter(|v| !v.is_null())?;
    match ctx.remediators.build(raw) {
        Ok(remediator) => Some(remediator),
        Err(e) => {
            tracing::warn!(error = %e, "unable to parse remediation");
            sink.add_breach(Breach::new_value("unable to parse remediation", e.to_string()));
            None
        }
    }
}

/// Apply the sink's breach template to `raw` and hand the result to the sink.
///
/// Template failures are reported as additional synthetic breaches; the
/// breach itself is still emitted with the unrendered field.
pub fn evaluate_template<S: BreachSink + ?Sized>(
    sink: &mut S,
    mut raw: Breach,
    remediation: Option<&Value>,
    ctx: &TemplateContext<'_>,
) {
    let remediator = resolve_remediator(sink, remediation, ctx);
    let template = sink.breach_template().clone();
    if let Some((check_type, check_name, severity)) = sink.check_identity() {
        raw.set_common_values(check_type, check_name, severity);
    }

    let Some(target) = template.breach_type else {
        raw.set_remediator(remediator);
        sink.add_breach(raw);
        return;
    };

    let mut fields = raw.fields();
    let data = render_data(&raw);
    let slots = [
        (&template.key_label, &mut fields.key_label),
        (&template.key, &mut fields.key),
        (&template.value_label, &mut fields.value_label),
        (&template.value, &mut fields.value),
    ];
    for (source, slot) in slots {
        if source.is_empty() {
            continue;
        }
        match ctx.renderer.render(source, &data) {
            Ok(rendered) => *slot = rendered,
            Err(failure) => {
                tracing::warn!(template = %source, failure = ?failure, "breach template failed");
                sink.add_breach(failure.into_breach());
            }
        }
    }

    let mut breach = target.reconstruct(fields, &raw);
    breach.set_remediator(remediator);
    sink.add_breach(breach);
}

/// Template functions that read collected facts.
///
/// `lookupFactAsStringMap fact key` returns the value under `key` of a
/// `map-string` fact, or an empty string.
pub fn fact_funcs(facts: &Manager<dyn Fact>) -> TemplateFuncs {
    let snapshot = facts.get_plugins();
    let lookup: TemplateFunc = Arc::new(move |args: &[Value]| {
        let (Some(fact), Some(key)) = (
            args.first().and_then(Value::as_str),
            args.get(1).and_then(Value::as_str),
        ) else {
            return Err("lookupFactAsStringMap expects a fact name and a key".to_string());
        };
        let value = snapshot
            .get(fact)
            .and_then(|f| f.read().data().as_map_string().remove(key))
            .unwrap_or_default();
        Ok(Value::String(value))
    });

    let mut funcs = TemplateFuncs::new();
    funcs.insert("lookupFactAsStringMap".to_string(), lookup);
    funcs
}
