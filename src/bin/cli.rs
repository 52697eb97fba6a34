use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use factguard::breach::Severity;
use factguard::config::Config;
use factguard::error::Error;
use factguard::{Engine, RunOptions};

#[derive(Parser)]
#[command(
    name = "factguard",
    about = "Collect facts, analyse them and report policy breaches",
    version,
    author
)]
struct Cli {
    /// Log level filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured check
    Run {
        /// Config file path (YAML, or TOML by extension)
        #[arg(long, short = 'c', default_value = Config::DEFAULT_PATH)]
        config: PathBuf,

        /// Only collect these facts (and their dependencies)
        #[arg(long = "fact", value_name = "ID")]
        facts: Vec<String>,

        /// Attempt remediation of detected breaches
        #[arg(long)]
        remediate: bool,

        /// Minimum severity to fail (low, normal, high, critical)
        #[arg(long)]
        fail_on: Option<String>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List all registered plugins
    ListPlugins,

    /// Generate a starter factguard.yml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            config,
            facts,
            remediate,
            fail_on,
            output,
        } => cmd_run(config, facts, remediate, fail_on, output),
        Commands::ListPlugins => cmd_list_plugins(),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn cmd_run(
    config: PathBuf,
    facts: Vec<String>,
    remediate: bool,
    fail_on_str: Option<String>,
    output_path: Option<PathBuf>,
) -> Result<i32, Error> {
    let fail_on = fail_on_str.and_then(|s| {
        let sev = Severity::from_str_lenient(&s);
        if sev.is_none() {
            eprintln!("Warning: unknown severity '{}', using config default", s);
        }
        sev
    });

    let options = RunOptions {
        only_facts: facts,
        remediate,
        fail_on,
    };
    let report = factguard::run(&config, &options)?;

    let rendered: String = report
        .rendered
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = pass, 1 = breaches at or above threshold
    Ok(if report.passed() { 0 } else { 1 })
}

fn cmd_list_plugins() -> Result<i32, Error> {
    let engine = Engine::with_builtins()?;
    let families = [
        ("connection", engine.connections().list_plugins()),
        ("fact", engine.facts().list_plugins()),
        ("analyser", engine.analysers().list_plugins()),
        ("output", engine.outputs().list_plugins()),
        ("remediator", engine.remediators().list()),
    ];

    println!("{:<12} PLUGIN", "FAMILY");
    println!("{}", "-".repeat(40));
    for (family, plugins) in &families {
        for plugin in plugins {
            println!("{:<12} {}", family, plugin);
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, Error> {
    let path = PathBuf::from(Config::DEFAULT_PATH);

    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", Config::DEFAULT_PATH);
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_yaml())?;
    println!("Created {}", Config::DEFAULT_PATH);

    Ok(0)
}
