use std::collections::HashSet;

use super::Fact;
use crate::connection::Connection;
use crate::error::Error;
use crate::plugin::support::{negotiate_connection, negotiate_input, resolve_additional_inputs};
use crate::plugin::{Handle, Manager};

/// How a single `collect_fact` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// The fact ran (now or earlier in the run). It may still carry errors.
    Collected,
    /// The fact, one of its ancestors, or its negotiation failed.
    Failed,
    /// No fact is configured under that id.
    Missing,
}

type Bound = (
    Option<Handle<dyn Connection>>,
    Option<Handle<dyn Fact>>,
    Vec<Handle<dyn Fact>>,
);

/// Resolves the fact dependency graph, collecting each fact at most once
/// per run.
///
/// Failures are recorded in the fact manager's error list; the collector
/// only tracks which ids are done, failed or currently being resolved.
#[derive(Debug, Default)]
pub struct Collector {
    collected: HashSet<String>,
    order: Vec<String>,
    failed: HashSet<String>,
    in_progress: Vec<String>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collected(&self, id: &str) -> bool {
        self.collected.contains(id)
    }

    /// True when the fact, one of its ancestors, or its negotiation failed.
    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.contains(id)
    }

    /// Ids in the order their `collect` ran.
    pub fn collected(&self) -> &[String] {
        &self.order
    }

    pub fn reset(&mut self) {
        self.collected.clear();
        self.order.clear();
        self.failed.clear();
        self.in_progress.clear();
    }

    /// Collect every configured fact in id order.
    ///
    /// A non-empty `only` restricts the entry points; dependencies of a
    /// selected fact are collected regardless.
    pub fn collect_all(
        &mut self,
        facts: &Manager<dyn Fact>,
        connections: &Manager<dyn Connection>,
        only: &[String],
    ) {
        for id in facts.get_plugins().keys() {
            if !only.is_empty() && !only.contains(id) {
                tracing::debug!(fact = %id, "fact not selected, skipping");
                continue;
            }
            self.collect_fact(id, facts, connections);
        }
    }

    /// Collect one fact after its inputs.
    pub fn collect_fact(
        &mut self,
        id: &str,
        facts: &Manager<dyn Fact>,
        connections: &Manager<dyn Connection>,
    ) -> CollectOutcome {
        if self.collected.contains(id) {
            return CollectOutcome::Collected;
        }
        if self.failed.contains(id) {
            return CollectOutcome::Failed;
        }
        if let Some(start) = self.in_progress.iter().position(|n| n == id) {
            let mut chain = self.in_progress[start..].to_vec();
            chain.push(id.to_string());
            tracing::error!(fact = id, chain = ?chain, "dependency cycle detected");
            facts.add_errors([Error::DependencyCycle(chain)]);
            self.failed.insert(id.to_string());
            return CollectOutcome::Failed;
        }
        let Some(handle) = facts.find_plugin(id) else {
            return CollectOutcome::Missing;
        };

        let (input_name, additional_names) = {
            let fact = handle.read();
            (
                fact.input_name().to_string(),
                fact.additional_input_names().to_vec(),
            )
        };

        self.in_progress.push(id.to_string());
        let mut upstream_failed = false;
        let dependencies = std::iter::once(&input_name)
            .filter(|name| !name.is_empty())
            .chain(additional_names.iter());
        for dependency in dependencies {
            match self.collect_fact(dependency, facts, connections) {
                CollectOutcome::Failed => upstream_failed = true,
                CollectOutcome::Collected => {
                    let has_errors = facts
                        .find_plugin(dependency)
                        .is_some_and(|dep| !dep.read().errors().is_empty());
                    upstream_failed |= has_errors;
                }
                // Reported by negotiation below.
                CollectOutcome::Missing => {}
            }
        }
        self.in_progress.pop();

        // Cycle detection above may have marked this id while it was on the stack.
        if upstream_failed || self.failed.contains(id) {
            tracing::debug!(fact = id, "input failed, not collecting");
            self.failed.insert(id.to_string());
            return CollectOutcome::Failed;
        }

        let (connection, input, additional) = match self.negotiate(id, &handle, facts, connections) {
            Ok(bound) => bound,
            Err(errors) => {
                for e in &errors {
                    tracing::error!(fact = id, error = %e, "fact validation failed");
                }
                facts.add_errors(errors);
                self.failed.insert(id.to_string());
                return CollectOutcome::Failed;
            }
        };

        let errors = {
            let mut fact = handle.write();
            fact.base_mut().bind(connection, input, additional);
            tracing::debug!(fact = id, plugin = fact.plugin_name(), "collecting fact");
            fact.collect();
            fact.errors().to_vec()
        };
        if !errors.is_empty() {
            for e in &errors {
                tracing::warn!(fact = id, error = %e, "fact collection reported an error");
            }
            facts.add_errors(errors);
        }

        self.collected.insert(id.to_string());
        self.order.push(id.to_string());
        CollectOutcome::Collected
    }

    fn negotiate(
        &self,
        id: &str,
        handle: &Handle<dyn Fact>,
        facts: &Manager<dyn Fact>,
        connections: &Manager<dyn Connection>,
    ) -> std::result::Result<Bound, Vec<Error>> {
        let (capabilities, connection_name, input_name, additional_names) = {
            let fact = handle.read();
            (
                fact.capabilities(),
                fact.connection_name().to_string(),
                fact.input_name().to_string(),
                fact.additional_input_names().to_vec(),
            )
        };

        let connection =
            negotiate_connection(id, &capabilities.connections, &connection_name, connections)
                .map_err(|e| vec![e])?;
        let input = negotiate_input(id, &capabilities.inputs, &input_name, facts)
            .map_err(|e| vec![e])?;
        let additional = resolve_additional_inputs(id, &additional_names, facts)?;
        Ok((connection, input, additional))
    }
}
