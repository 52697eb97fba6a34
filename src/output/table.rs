use serde::Deserialize;

use super::Outputter;
use crate::breach::Severity;
use crate::error::Result;
use crate::plugin::{decode_into, Plugin, PluginBase};
use crate::result::{ResultList, Status};

/// Plain-text report grouped per result, failures first.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TableOutput {
    #[serde(skip)]
    base: PluginBase,
    /// Also list results that passed.
    #[serde(rename = "show-passes")]
    pub show_passes: bool,
}

impl TableOutput {
    pub const NAME: &'static str = "table";

    pub fn new(id: &str) -> Self {
        Self {
            base: PluginBase::new(id),
            show_passes: false,
        }
    }
}

impl Plugin for TableOutput {
    fn plugin_name(&self) -> &'static str {
        Self::NAME
    }

    fn plugin_base(&self) -> &PluginBase {
        &self.base
    }

    fn plugin_base_mut(&mut self) -> &mut PluginBase {
        &mut self.base
    }

    fn configure(&mut self, raw: serde_yaml::Value) -> Result<()> {
        decode_into(self, "output", raw)
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[CRITICAL]",
        Severity::High => "[HIGH]    ",
        Severity::Normal => "[NORMAL]  ",
        Severity::Low => "[LOW]     ",
    }
}

impl Outputter for TableOutput {
    fn render(&self, results: &ResultList) -> Result<String> {
        let mut output = String::new();

        let mut sorted: Vec<_> = results.results.iter().collect();
        sorted.sort_by(|a, b| {
            (b.status == Status::Fail)
                .cmp(&(a.status == Status::Fail))
                .then_with(|| b.severity.cmp(&a.severity))
                .then_with(|| a.name.cmp(&b.name))
        });

        let failing = sorted.iter().filter(|r| r.status == Status::Fail).count();
        if failing == 0 {
            output.push_str("\n  No breaches detected.\n\n");
        } else {
            output.push_str(&format!(
                "\n  {} of {} check(s) failed, {} breach(es):\n\n",
                failing, results.total_checks, results.total_breaches
            ));
        }

        for result in &sorted {
            if result.status == Status::Pass && !self.show_passes {
                continue;
            }
            output.push_str(&format!(
                "  {} {} {} ({})\n",
                severity_tag(result.severity),
                result.status.to_string().to_uppercase(),
                result.name,
                result.check_type
            ));
            for breach in &result.breaches {
                output.push_str(&format!("           - {}\n", breach));
                if let Some(remediation) = breach.remediation() {
                    output.push_str(&format!(
                        "             remediation: {} {}\n",
                        remediation.status,
                        remediation.messages.join("; ")
                    ));
                }
            }
            for warning in &result.warnings {
                output.push_str(&format!("           warning: {}\n", warning));
            }
            output.push('\n');
        }

        if !results.errors.is_empty() {
            output.push_str("  Errors:\n");
            for error in &results.errors {
                output.push_str(&format!("    {}\n", error));
            }
            output.push('\n');
        }

        if let Some(verdict) = &results.verdict {
            let status = if verdict.pass { "PASS" } else { "FAIL" };
            output.push_str(&format!(
                "  Result: {} (threshold: {}, highest: {})\n\n",
                status,
                verdict.fail_threshold,
                verdict
                    .highest_severity
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".into()),
            ));
        }

        Ok(output)
    }
}
