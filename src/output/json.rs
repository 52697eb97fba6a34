use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Outputter;
use crate::error::{Error, Result};
use crate::plugin::{decode_into, Plugin, PluginBase};
use crate::result::ResultList;

/// JSON report of a run.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct JsonOutput {
    #[serde(skip)]
    base: PluginBase,
    pub pretty: bool,
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self {
            base: PluginBase::default(),
            pretty: true,
        }
    }
}

impl JsonOutput {
    pub const NAME: &'static str = "json";

    pub fn new(id: &str) -> Self {
        Self {
            base: PluginBase::new(id),
            ..Default::default()
        }
    }
}

impl Plugin for JsonOutput {
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

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(rename = "run-id")]
    run_id: Uuid,
    timestamp: DateTime<Utc>,
    status: String,
    #[serde(flatten)]
    results: &'a ResultList,
}

impl Outputter for JsonOutput {
    fn render(&self, results: &ResultList) -> Result<String> {
        let report = JsonReport {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            status: results.status().to_string(),
            results,
        };
        let json = if self.pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };
        json.map_err(|e| Error::Output(e.to_string()))
    }
}
