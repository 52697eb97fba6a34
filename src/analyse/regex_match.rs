use regex::Regex;
use serde::Deserialize;

use super::{analyser_plugin, Analyser, AnalyserBase};
use crate::breach::template::TemplateContext;
use crate::breach::Breach;
use crate::data::FactData;

/// Breaches on input values matching `pattern`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegexMatch {
    #[serde(flatten)]
    base: AnalyserBase,
    pub pattern: String,
    /// Values matching this pattern are never reported.
    pub ignore: String,
}

/// Breaches on input values not matching `pattern`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegexNotMatch {
    #[serde(flatten)]
    base: AnalyserBase,
    pub pattern: String,
    pub ignore: String,
}

impl RegexMatch {
    pub const NAME: &'static str = "regex:match";

    pub fn new(id: &str) -> Self {
        Self {
            base: AnalyserBase::new(id),
            ..Default::default()
        }
    }
}

impl RegexNotMatch {
    pub const NAME: &'static str = "regex:not-match";

    pub fn new(id: &str) -> Self {
        Self {
            base: AnalyserBase::new(id),
            ..Default::default()
        }
    }
}

analyser_plugin!(RegexMatch);
analyser_plugin!(RegexNotMatch);

impl Analyser for RegexMatch {
    fn base(&self) -> &AnalyserBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AnalyserBase {
        &mut self.base
    }

    fn analyse(&mut self, ctx: &TemplateContext<'_>) {
        let (pattern, ignore) = (self.pattern.clone(), self.ignore.clone());
        analyse_pattern(self, &pattern, &ignore, true, ctx);
    }
}

impl Analyser for RegexNotMatch {
    fn base(&self) -> &AnalyserBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AnalyserBase {
        &mut self.base
    }

    fn analyse(&mut self, ctx: &TemplateContext<'_>) {
        let (pattern, ignore) = (self.pattern.clone(), self.ignore.clone());
        analyse_pattern(self, &pattern, &ignore, false, ctx);
    }
}

fn compile<A: Analyser>(analyser: &mut A, label: &str, pattern: &str, ctx: &TemplateContext<'_>) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(analyser = %analyser.id(), pattern, error = %e, "invalid pattern");
            analyser.emit_plain(Breach::new_value(label, e.to_string()), ctx);
            None
        }
    }
}

/// Report values whose match against `pattern` equals `breach_on_match`.
fn analyse_pattern<A: Analyser>(
    analyser: &mut A,
    pattern: &str,
    ignore: &str,
    breach_on_match: bool,
    ctx: &TemplateContext<'_>,
) {
    let Some(data) = analyser.input_data() else {
        return;
    };
    if data == FactData::Nil {
        return;
    }

    let Some(re) = compile(analyser, "invalid pattern", pattern, ctx) else {
        return;
    };
    let ignore = if ignore.is_empty() {
        None
    } else {
        match compile(analyser, "invalid ignore pattern", ignore, ctx) {
            Some(re) => Some(re),
            None => return,
        }
    };
    let reportable = |value: &str| {
        re.is_match(value) == breach_on_match && !ignore.as_ref().is_some_and(|i| i.is_match(value))
    };
    let input_name = analyser.input_name().to_string();

    let mut breaches = Vec::new();
    match &data {
        FactData::String(s) => {
            if reportable(s) {
                breaches.push(Breach::new_value("", format!("{input_name} equals '{s}'")));
            }
        }
        FactData::List(items) => {
            breaches.extend(items.iter().filter(|v| reportable(v)).map(|v| Breach::new_value("", v.clone())));
        }
        FactData::MapString(map) => {
            for (k, v) in map {
                if reportable(v) {
                    breaches.push(Breach::key_value("", k.clone(), "", v.clone()));
                }
            }
        }
        FactData::MapNestedString(map) => {
            for (k, nested) in map {
                for (sub_key, v) in nested {
                    if reportable(v) {
                        breaches.push(Breach::key_value("", k.clone(), sub_key.clone(), v.clone()));
                    }
                }
            }
        }
        other => {
            tracing::debug!(input_format = %other.format(), "unsupported input format");
            let message = format!("unsupported input format {}", other.format());
            analyser.emit_plain(Breach::new_value("", message), ctx);
            return;
        }
    }

    for breach in breaches {
        analyser.emit(breach, ctx);
    }
}
