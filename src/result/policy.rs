use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{ResultList, Status};
use crate::breach::Severity;

/// Policy verdict: the final pass/fail decision after applying the ignore
/// list and severity overrides to the run's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub pass: bool,
    #[serde(rename = "total-results")]
    pub total_results: usize,
    #[serde(rename = "failing-results")]
    pub failing_results: usize,
    #[serde(rename = "highest-severity")]
    pub highest_severity: Option<Severity>,
    #[serde(rename = "fail-threshold")]
    pub fail_threshold: Severity,
    pub errors: usize,
}

/// Policy configuration, the `policy` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Minimum severity of a failing result that fails the run.
    #[serde(default = "default_fail_on", rename = "fail-on")]
    pub fail_on: Severity,
    /// Analyser ids to ignore entirely.
    #[serde(default)]
    pub ignore: HashSet<String>,
    /// Per-analyser severity overrides.
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

fn default_fail_on() -> Severity {
    Severity::Low
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            ignore: HashSet::new(),
            overrides: HashMap::new(),
        }
    }
}

impl Policy {
    /// Remove ignored results and apply severity overrides in place.
    pub fn apply(&self, list: &mut ResultList) {
        list.results.retain(|r| !self.ignore.contains(&r.id));
        for result in &mut list.results {
            let Some(&severity) = self.overrides.get(&result.id) else {
                continue;
            };
            result.severity = severity;
            for breach in &mut result.breaches {
                breach.common_mut().severity = severity;
            }
        }
    }

    /// Decide the verdict for results already passed through [`Policy::apply`].
    pub fn evaluate(&self, list: &ResultList) -> PolicyVerdict {
        let failing: Vec<Severity> = list
            .results
            .iter()
            .filter(|r| r.status == Status::Fail)
            .map(|r| r.severity)
            .collect();

        let highest = failing.iter().copied().max();
        let failed = failing.iter().any(|&sev| sev >= self.fail_on) || !list.errors.is_empty();

        PolicyVerdict {
            pass: !failed,
            total_results: list.results.len(),
            failing_results: failing.len(),
            highest_severity: highest,
            fail_threshold: self.fail_on,
            errors: list.errors.len(),
        }
    }
}
