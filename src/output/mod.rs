//! Output plugins: render a run's results for people or machines.

pub mod json;
pub mod table;

use crate::error::Result;
use crate::plugin::{Manager, Plugin};
use crate::result::ResultList;

pub use json::JsonOutput;
pub use table::TableOutput;

pub trait Outputter: Plugin {
    fn render(&self, results: &ResultList) -> Result<String>;
}

/// Register every built-in output.
pub fn register_all(outputs: &Manager<dyn Outputter>) -> Result<()> {
    outputs.register_factory(TableOutput::NAME, |id| Box::new(TableOutput::new(id)))?;
    outputs.register_factory(JsonOutput::NAME, |id| Box::new(JsonOutput::new(id)))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::breach::{Breach, Severity};
    use crate::result::{AnalysisResult, Policy, Status};

    /// One passing and one failing result, verdict applied.
    pub(crate) fn sample() -> ResultList {
        let mut list = ResultList::new(false);

        let mut breach = Breach::key_value("key", "web", "disallowed", "php:7.4");
        breach.set_common_values("allowed:list", "images", Severity::High);
        let mut failing = AnalysisResult {
            id: "images".into(),
            name: "Allowed images".into(),
            severity: Severity::High,
            check_type: "allowed:list".into(),
            breaches: vec![breach],
            ..Default::default()
        };
        failing.determine_status(false);

        let mut passing = AnalysisResult {
            id: "debug-off".into(),
            name: "Debug is off".into(),
            check_type: "equals".into(),
            ..Default::default()
        };
        passing.determine_status(false);

        list.add_result(failing);
        list.add_result(passing);
        list.sort();
        list.verdict = Some(Policy::default().evaluate(&list));
        assert_eq!(list.status(), Status::Fail);
        list
    }

    #[test]
    fn builtins_are_registered() {
        let outputs: Manager<dyn Outputter> = Manager::new("output");
        register_all(&outputs).unwrap();
        assert_eq!(outputs.list_plugins(), vec!["json", "table"]);
    }
}
