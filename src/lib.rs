//! factguard: policy and compliance checks over collected facts.
//!
//! Facts gather data from the target environment (files, commands,
//! containers, YAML documents), analysers evaluate them and report
//! breaches, and outputs render the results.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use factguard::{run, RunOptions};
//!
//! let report = run(Path::new("factguard.yml"), &RunOptions::default()).unwrap();
//! println!("Pass: {}", report.results.verdict.as_ref().map_or(false, |v| v.pass));
//! ```

pub mod analyse;
pub mod breach;
pub mod command;
pub mod config;
pub mod connection;
pub mod data;
pub mod engine;
pub mod error;
pub mod fact;
pub mod output;
pub mod plugin;
pub mod remediation;
pub mod result;

#[cfg(test)]
mod testing;

use std::path::Path;

use config::Config;
use error::Result;

pub use engine::{Engine, Rendered, RunOptions};
pub use result::ResultList;

/// Complete run report.
#[derive(Debug)]
pub struct Report {
    pub results: ResultList,
    pub rendered: Vec<Rendered>,
}

impl Report {
    /// True when the policy verdict passed.
    pub fn passed(&self) -> bool {
        self.results.verdict.as_ref().is_some_and(|v| v.pass)
    }
}

/// Run a complete check: load config, collect facts, analyse, apply the
/// policy and render every configured output.
pub fn run(config_path: &Path, options: &RunOptions) -> Result<Report> {
    let config = Config::load(config_path)?;
    let mut engine = Engine::with_builtins()?;
    engine.load(&config);

    let results = engine.run(options);
    let rendered = engine.render(&results)?;
    Ok(Report { results, rendered })
}
