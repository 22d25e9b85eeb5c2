//! Main CLI application

use crate::definition::parse_definition_file;
use crate::runner::{
    Engine, EngineConfig, ExecutionFailure, FixtureCaller, Workflow,
    DEFAULT_MAX_CONCURRENT_BRANCHES,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::builder::FalseyValueParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::{generate, Shell};
use colored::Colorize;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("swrun")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run serverless workflow task trees")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log more detail (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a workflow and print its output as JSON")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("Workflow definition (YAML or JSON)")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("JSON")
                        .help("Initial state as a JSON object, merged over the workflow input"),
                )
                .arg(
                    Arg::new("fixtures")
                        .long("fixtures")
                        .value_name("FILE")
                        .help("Recorded call responses keyed by \"METHOD target\"")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("max-branches")
                        .long("max-branches")
                        .value_name("N")
                        .help("Maximum fork branches run at once (0 = unbounded)")
                        .env("SWRUN_MAX_BRANCHES")
                        .value_parser(value_parser!(usize))
                        .default_value(DEFAULT_MAX_CONCURRENT_BRANCHES.to_string()),
                )
                .arg(
                    Arg::new("allow-error-status")
                        .long("allow-error-status")
                        .help("Treat call responses with status >= 400 as ordinary results")
                        .env("SWRUN_ALLOW_ERROR_STATUS")
                        .value_parser(FalseyValueParser::new())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check workflow definitions without running them")
                .arg(
                    Arg::new("files")
                        .value_name("FILE")
                        .help("Workflow definitions to check")
                        .value_parser(value_parser!(PathBuf))
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .value_parser(value_parser!(Shell))
                        .required(true),
                ),
        )
}

/// Run the CLI application with process arguments
pub fn run() -> Result<()> {
    // Environment configuration may come from a .env file
    dotenvy::dotenv().ok();

    let matches = build_command().get_matches();
    run_matches(&matches)
}

/// Run the CLI application with parsed arguments
pub fn run_matches(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("completions", sub)) => {
            let shell = sub
                .get_one::<Shell>("shell")
                .copied()
                .ok_or_else(|| anyhow!("missing shell"))?;
            generate(shell, &mut build_command(), "swrun", &mut io::stdout());
            Ok(())
        }
        Some(("run", sub)) => {
            init_tracing(log_filter(matches));
            run_workflow(sub)
        }
        Some(("validate", sub)) => {
            init_tracing(log_filter(matches));
            validate_files(sub)
        }
        _ => {
            build_command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Map verbosity flags to a log filter
fn log_filter(matches: &ArgMatches) -> &'static str {
    match matches.get_count("verbose") {
        0 if matches.get_flag("quiet") => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the log subscriber; `RUST_LOG` wins over the flags
fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn run_workflow(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("missing workflow file"))?;
    let workflow = load_workflow(path)?;

    let input = matches
        .get_one::<String>("input")
        .map(String::as_str)
        .map(parse_input)
        .transpose()?;

    let caller = match matches.get_one::<PathBuf>("fixtures") {
        Some(fixtures) => load_fixtures(fixtures)?,
        None => FixtureCaller::new(),
    };

    let config = EngineConfig::new()
        .with_max_concurrent_branches(
            matches
                .get_one::<usize>("max-branches")
                .copied()
                .unwrap_or(DEFAULT_MAX_CONCURRENT_BRANCHES),
        )
        .with_reject_error_status(!matches.get_flag("allow-error-status"));

    let engine = Engine::new(Arc::new(caller)).with_config(config);
    let state = workflow.initial_state(input);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(engine.execute(&workflow, state)) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output.into_value())?);
            Ok(())
        }
        Err(ExecutionFailure { error, state }) => {
            println!("{}", serde_json::to_string_pretty(&state.into_value())?);
            Err(anyhow::Error::new(error).context(format!("Workflow '{}' failed", workflow.name())))
        }
    }
}

fn validate_files(matches: &ArgMatches) -> Result<()> {
    let files: Vec<&PathBuf> = matches
        .get_many::<PathBuf>("files")
        .map(|files| files.collect())
        .unwrap_or_default();

    let mut failed = 0;
    for path in &files {
        match load_workflow(path) {
            Ok(_) => println!("{}: {}", path.display(), "ok".green()),
            Err(err) => {
                failed += 1;
                println!("{}: {}", path.display(), format!("{:#}", err).red());
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} workflow definitions are invalid", failed, files.len());
    }

    Ok(())
}

/// Load, validate and convert a workflow definition
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let definition = parse_definition_file(path)
        .with_context(|| format!("Failed to load '{}'", path.display()))?;

    Workflow::from_definition(&definition)
        .with_context(|| format!("Invalid workflow '{}'", path.display()))
}

/// Load recorded call responses
pub fn load_fixtures(path: &Path) -> Result<FixtureCaller> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixtures '{}'", path.display()))?;

    FixtureCaller::parse(&contents)
        .with_context(|| format!("Invalid fixtures '{}'", path.display()))
}

/// Parse `--input` as a JSON object
fn parse_input(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).context("--input is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--input must be a JSON object, got {}", other),
    }
}
