//! Per-analyser results and their aggregation over a run.

pub mod policy;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::breach::{Breach, Severity};
use crate::remediation::RemediationStatus;

pub use policy::{Policy, PolicyVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pass,
    Fail,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Remediation outcomes of a result's breaches, by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemediationCounts {
    pub unsupported: usize,
    pub success: usize,
    pub failed: usize,
    pub partial: usize,
}

/// The outcome of one analyser.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Analyser id.
    pub id: String,
    pub name: String,
    pub severity: Severity,
    #[serde(rename = "check-type")]
    pub check_type: String,
    pub passes: Vec<String>,
    pub breaches: Vec<Breach>,
    pub warnings: Vec<String>,
    pub status: Status,
    #[serde(rename = "remediation-status", skip_serializing_if = "Option::is_none")]
    pub remediation_status: Option<RemediationStatus>,
}

impl AnalysisResult {
    /// Order breaches by check name, passes and warnings alphabetically.
    pub fn sort(&mut self) {
        self.breaches.sort_by(|a, b| a.check_name().cmp(b.check_name()));
        self.passes.sort();
        self.warnings.sort();
    }

    pub fn remediations_count(&self) -> RemediationCounts {
        let mut counts = RemediationCounts::default();
        for breach in &self.breaches {
            match breach.remediation().map(|r| r.status) {
                Some(RemediationStatus::NoSupport) => counts.unsupported += 1,
                Some(RemediationStatus::Success) => counts.success += 1,
                Some(RemediationStatus::Failed) => counts.failed += 1,
                Some(RemediationStatus::Partial) => counts.partial += 1,
                None => {}
            }
        }
        counts
    }

    /// Compute the pass/fail status and, after remediation, the aggregate
    /// remediation status.
    pub fn determine_status(&mut self, remediation_performed: bool) {
        self.sort();

        if !remediation_performed {
            self.status = if self.breaches.is_empty() {
                Status::Pass
            } else {
                Status::Fail
            };
            return;
        }

        let c = self.remediations_count();
        let (remediation, status) = if c.partial > 0 || (c.success > 0 && (c.failed > 0 || c.unsupported > 0)) {
            (RemediationStatus::Partial, Status::Fail)
        } else if c.failed > 0 {
            (RemediationStatus::Failed, Status::Fail)
        } else if c.unsupported > 0 {
            (RemediationStatus::NoSupport, Status::Fail)
        } else {
            (RemediationStatus::Success, Status::Pass)
        };
        self.remediation_status = Some(remediation);
        self.status = status;
    }
}

/// Every result of a run plus the counters reported alongside them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultList {
    #[serde(rename = "remediation-performed")]
    pub remediation_performed: bool,
    #[serde(rename = "total-checks")]
    pub total_checks: usize,
    #[serde(rename = "total-breaches")]
    pub total_breaches: usize,
    #[serde(rename = "total-remediations")]
    pub total_remediations: usize,
    #[serde(rename = "total-unsupported-remediations")]
    pub total_unsupported_remediations: usize,
    #[serde(rename = "check-count-by-type")]
    pub check_count_by_type: BTreeMap<String, usize>,
    #[serde(rename = "breach-count-by-type")]
    pub breach_count_by_type: BTreeMap<String, usize>,
    #[serde(rename = "breach-count-by-severity")]
    pub breach_count_by_severity: BTreeMap<String, usize>,
    #[serde(rename = "remediation-count-by-type")]
    pub remediation_count_by_type: BTreeMap<String, usize>,
    pub results: Vec<AnalysisResult>,
    /// Engine errors recorded during the run, as messages.
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<PolicyVerdict>,
}

impl ResultList {
    pub fn new(remediation_performed: bool) -> Self {
        Self {
            remediation_performed,
            ..Default::default()
        }
    }

    /// `Fail` if any result failed.
    pub fn status(&self) -> Status {
        if self.results.iter().any(|r| r.status == Status::Fail) {
            Status::Fail
        } else {
            Status::Pass
        }
    }

    pub fn add_result(&mut self, result: AnalysisResult) {
        let breaches = result.breaches.len();
        self.total_checks += 1;
        *self.check_count_by_type.entry(result.check_type.clone()).or_default() += 1;
        self.total_breaches += breaches;
        *self.breach_count_by_type.entry(result.check_type.clone()).or_default() += breaches;
        *self
            .breach_count_by_severity
            .entry(result.severity.to_string())
            .or_default() += breaches;

        if self.remediation_performed {
            let counts = result.remediations_count();
            let attempted = counts.success + counts.failed + counts.partial;
            self.total_remediations += attempted;
            self.total_unsupported_remediations += counts.unsupported;
            *self
                .remediation_count_by_type
                .entry(result.check_type.clone())
                .or_default() += attempted;
        }
        self.results.push(result);
    }

    pub fn breaches_by_check_name(&self, name: &str) -> Vec<&Breach> {
        self.results
            .iter()
            .filter(|r| r.name == name)
            .flat_map(|r| r.breaches.iter())
            .collect()
    }

    pub fn breaches_by_severity(&self, severity: Severity) -> Vec<&Breach> {
        self.results
            .iter()
            .filter(|r| r.severity == severity)
            .flat_map(|r| r.breaches.iter())
            .collect()
    }

    /// Order results by name.
    pub fn sort(&mut self) {
        self.results.sort_by(|a, b| a.name.cmp(&b.name));
    }
}
