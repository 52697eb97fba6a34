//! The composition root: owns every plugin family and drives one run.

use crate::analyse::{self, Analyser};
use crate::breach::template::{fact_funcs, BreachRenderer, TemplateContext};
use crate::breach::Severity;
use crate::config::Config;
use crate::connection::{self, Connection};
use crate::error::{Error, Result};
use crate::fact::{self, Collector, Fact};
use crate::output::{self, Outputter, TableOutput};
use crate::plugin::{Manager, Plugin};
use crate::remediation::RemediatorRegistry;
use crate::result::{Policy, ResultList};

/// Per-run switches, usually taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict collection to these fact ids and their dependencies.
    pub only_facts: Vec<String>,
    pub remediate: bool,
    /// Replaces the configured policy threshold.
    pub fail_on: Option<Severity>,
}

/// One rendered report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub output: String,
    pub content: String,
}

pub struct Engine {
    connections: Manager<dyn Connection>,
    facts: Manager<dyn Fact>,
    analysers: Manager<dyn Analyser>,
    outputs: Manager<dyn Outputter>,
    remediators: RemediatorRegistry,
    collector: Collector,
    policy: Policy,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("connections", &self.connections.list_plugins())
            .field("facts", &self.facts.list_plugins())
            .field("analysers", &self.analysers.list_plugins())
            .field("outputs", &self.outputs.list_plugins())
            .field("remediators", &self.remediators)
            .finish()
    }
}

impl Engine {
    /// An engine with no registered plugins.
    pub fn new() -> Self {
        Self {
            connections: Manager::new("connection"),
            facts: Manager::new("fact"),
            analysers: Manager::new("analyser"),
            outputs: Manager::new("output"),
            remediators: RemediatorRegistry::new(),
            collector: Collector::new(),
            policy: Policy::default(),
        }
    }

    /// An engine with every built-in plugin registered.
    pub fn with_builtins() -> Result<Self> {
        let mut engine = Self::new();
        connection::register_all(&engine.connections)?;
        fact::builtin::register_all(&engine.facts)?;
        analyse::register_all(&engine.analysers)?;
        output::register_all(&engine.outputs)?;
        engine.remediators = RemediatorRegistry::with_builtins();
        Ok(engine)
    }

    pub fn connections(&self) -> &Manager<dyn Connection> {
        &self.connections
    }

    pub fn facts(&self) -> &Manager<dyn Fact> {
        &self.facts
    }

    pub fn analysers(&self) -> &Manager<dyn Analyser> {
        &self.analysers
    }

    pub fn outputs(&self) -> &Manager<dyn Outputter> {
        &self.outputs
    }

    pub fn remediators(&self) -> &RemediatorRegistry {
        &self.remediators
    }

    pub fn remediators_mut(&mut self) -> &mut RemediatorRegistry {
        &mut self.remediators
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Instantiate every configured plugin and take the policy.
    pub fn load(&mut self, config: &Config) {
        self.connections.parse_config(&config.connections);
        self.facts.parse_config(&config.collect);
        self.analysers.parse_config(&config.analyse);
        self.outputs.parse_config(&config.output);
        self.policy = config.policy.clone();
    }

    /// Every error recorded so far, family by family.
    pub fn errors(&self) -> Vec<Error> {
        let mut errors = self.connections.errors();
        errors.extend(self.facts.errors());
        errors.extend(self.analysers.errors());
        errors.extend(self.outputs.errors());
        errors
    }

    /// Validate, collect, analyse, optionally remediate, then apply the
    /// policy.
    pub fn run(&mut self, options: &RunOptions) -> ResultList {
        let analysers = self.analysers.get_plugins();
        for (id, analyser) in &analysers {
            if let Err(e) = analyser.write().validate_input(&self.facts) {
                tracing::error!(analyser = %id, error = %e, "failed to validate analyser input");
                self.analysers.add_errors([e]);
            }
        }

        self.collector
            .collect_all(&self.facts, &self.connections, &options.only_facts);

        let renderer = BreachRenderer::new(&fact_funcs(&self.facts));
        let ctx = TemplateContext {
            renderer: &renderer,
            remediators: &self.remediators,
        };

        let mut list = ResultList::new(options.remediate);
        for (id, analyser) in &analysers {
            let mut analyser = analyser.write();
            let input_failed = self.collector.is_failed(analyser.input_name());
            if !options.only_facts.is_empty()
                && !input_failed
                && !self.collector.is_collected(analyser.input_name())
            {
                tracing::debug!(analyser = %id, input = %analyser.input_name(), "input not collected, skipping");
                continue;
            }

            tracing::debug!(analyser = %id, plugin = analyser.plugin_name(), "analysing");
            if analyser.pre_process_input(input_failed) {
                analyser.analyse(&ctx);
            }
            analyser.finish();

            let mut result = analyser.result();
            if options.remediate {
                for breach in &mut result.breaches {
                    breach.perform_remediation();
                }
            }
            result.determine_status(options.remediate);
            list.add_result(result);
        }
        list.sort();

        list.errors = self.errors().iter().map(ToString::to_string).collect();

        let mut policy = self.policy.clone();
        if let Some(fail_on) = options.fail_on {
            policy.fail_on = fail_on;
        }
        policy.apply(&mut list);
        let verdict = policy.evaluate(&list);
        tracing::info!(
            pass = verdict.pass,
            results = verdict.total_results,
            failing = verdict.failing_results,
            errors = verdict.errors,
            "run complete"
        );
        list.verdict = Some(verdict);
        list
    }

    /// Render `results` with every configured output, or with a plain
    /// table when none is configured.
    pub fn render(&self, results: &ResultList) -> Result<Vec<Rendered>> {
        let outputs = self.outputs.get_plugins();
        if outputs.is_empty() {
            let table = TableOutput::new("default");
            return Ok(vec![Rendered {
                output: table.id().to_string(),
                content: table.render(results)?,
            }]);
        }

        outputs
            .iter()
            .map(|(id, output)| -> Result<Rendered> {
                Ok(Rendered {
                    output: id.clone(),
                    content: output.read().render(results)?,
                })
            })
            .collect()
    }

    /// Drop every instance, error and collected mark; registrations stay.
    pub fn reset(&mut self) {
        self.connections.reset_plugins();
        self.connections.reset_errors();
        self.facts.reset_plugins();
        self.facts.reset_errors();
        self.analysers.reset_plugins();
        self.analysers.reset_errors();
        self.outputs.reset_plugins();
        self.outputs.reset_errors();
        self.collector.reset();
        self.policy = Policy::default();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ConfigFormat;
    use crate::result::Status;

    fn engine(yaml: &str) -> Engine {
        let mut engine = Engine::with_builtins().unwrap();
        let config = Config::parse(yaml, ConfigFormat::Yaml).unwrap();
        engine.load(&config);
        engine
    }

    fn compose_config(dir: &std::path::Path) -> String {
        fs::write(
            dir.join("compose.yml"),
            "images:\n  web: nginx\n  db: mysql:5.7\n",
        )
        .unwrap();
        format!(
            r#"
collect:
  compose:
    file:read:
      path: {path}
  services:
    yaml:key:
      input: compose
      path: images
analyse:
  images:
    allowed:list:
      description: Approved images only
      input: services
      severity: high
      package-match: true
      allowed: ["nginx", "mysql:8.0"]
"#,
            path = dir.join("compose.yml").display()
        )
    }

    #[test]
    fn end_to_end_run_reports_disallowed_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&compose_config(dir.path()));

        let results = engine.run(&RunOptions::default());

        assert!(engine.errors().is_empty(), "{:?}", engine.errors());
        assert_eq!(engine.collector().collected(), ["compose", "services"]);
        assert_eq!(results.results.len(), 1);
        let result = &results.results[0];
        assert_eq!(result.name, "Approved images only");
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.breaches.len(), 1);
        assert_eq!(result.breaches[0].key(), "db");
        assert_eq!(result.breaches[0].value_label(), "disallowed");
        assert_eq!(result.breaches[0].value(), "mysql:5.7");
        assert!(!results.verdict.as_ref().unwrap().pass);
    }

    #[test]
    fn fail_on_override_can_pass_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&compose_config(dir.path()));
        let results = engine.run(&RunOptions {
            fail_on: Some(Severity::Critical),
            ..Default::default()
        });
        assert_eq!(results.status(), Status::Fail);
        assert!(results.verdict.unwrap().pass);
    }

    #[test]
    fn missing_input_is_an_error_and_a_breach() {
        let mut engine = engine("analyse:\n  orphan:\n    not:empty:\n      input: ghost\n");
        let results = engine.run(&RunOptions::default());

        assert_eq!(engine.errors().len(), 1);
        assert!(matches!(engine.errors()[0], Error::SupportNotFound { .. }));
        assert_eq!(results.results[0].breaches[0].value(), "no input available to analyse");
        assert_eq!(results.errors.len(), 1);
        assert!(!results.verdict.unwrap().pass);
    }

    #[test]
    fn check_on_a_failed_fact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&format!(
            r#"
collect:
  source:
    file:read:
      path: {path}
  debug:
    yaml:key:
      input: source
      path: app
analyse:
  debug-set:
    not:empty:
      input: debug
"#,
            path = dir.path().join("missing.yml").display()
        ));

        let results = engine.run(&RunOptions::default());

        assert!(engine.collector().is_failed("debug"));
        assert_eq!(results.results.len(), 1);
        let result = &results.results[0];
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.breaches[0].key(), "input failure");
        assert!(!results.verdict.unwrap().pass);
    }

    #[test]
    fn filtered_run_skips_analysers_of_uncollected_facts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = compose_config(dir.path());
        config.push_str("  hostname:\n    not:empty:\n      input: other\n");
        config = config.replace(
            "analyse:\n",
            "  other:\n    file:read:\n      path: /nonexistent\nanalyse:\n",
        );
        let mut engine = engine(&config);

        let results = engine.run(&RunOptions {
            only_facts: vec!["services".into()],
            ..Default::default()
        });
        assert_eq!(engine.collector().collected(), ["compose", "services"]);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].id, "images");
    }

    #[test]
    fn render_falls_back_to_table() {
        let mut engine = engine("");
        let results = engine.run(&RunOptions::default());
        let rendered = engine.render(&results).unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].output, "default");
        assert!(rendered[0].content.contains("No breaches detected."));
    }

    #[test]
    fn reset_clears_instances_but_keeps_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&compose_config(dir.path()));
        engine.run(&RunOptions::default());
        engine.reset();

        assert!(engine.facts().get_plugins().is_empty());
        assert!(engine.collector().collected().is_empty());
        assert!(engine.facts().has_factory("file:read"));
    }
}
