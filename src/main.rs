//! Procflow CLI Entry Point
//!
//! Provides command-line interface for running and resuming workflows.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow against an entity
//! procflow run review.yaml --entity product.json --entity-type data_product --entity-id dp-1
//!
//! # Resolve a paused approval
//! procflow resume 7f7c9c1e-... --approve --data '{"comment": "looks good"}'
//!
//! # Inspect executions
//! procflow list
//! procflow show 7f7c9c1e-...
//!
//! # Lint a workflow file
//! procflow validate review.yaml
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use colored::{ColoredString, Colorize};
use log::{error, info};
use serde_json::{Map, Value};

use procflow::config::EngineConfig;
use procflow::error::EngineError;
use procflow::execution::{Engine, ExecutionStatus, RunRequest, TriggerContext, WorkflowExecution};
use procflow::handlers::HandlerServices;
use procflow::monitoring::ExecutionTimeline;
use procflow::policy::InMemoryPolicyStore;
use procflow::store::{FileExecutionStore, FileWorkflowStore};
use procflow::workflow::{load_workflow, validate_workflow};
use procflow::{APP_NAME, VERSION};

/// Subcommand parsed from the positional arguments.
#[derive(Debug, PartialEq)]
enum Command {
    Run {
        workflow_path: PathBuf,
        entity_path: PathBuf,
        entity_type: String,
        entity_id: String,
        entity_name: Option<String>,
        actor: Option<String>,
    },
    Resume {
        execution_id: String,
        approve: bool,
        data: Option<String>,
    },
    Show {
        execution_id: String,
    },
    List,
    Validate {
        workflow_path: PathBuf,
    },
}

/// Command-line configuration parsed from arguments.
#[derive(Debug, PartialEq)]
struct Config {
    command: Command,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    verbose: bool,
}

/// Per-command options collected before the command is known.
#[derive(Debug, Default)]
struct CommandOptions {
    entity: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<String>,
    entity_name: Option<String>,
    actor: Option<String>,
    data: Option<String>,
    decision: Option<bool>,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Process Automation Workflow Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: procflow [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("Commands:");
    println!("  run <WORKFLOW_FILE>      Run a workflow against an entity");
    println!("      --entity FILE        JSON file holding the entity object");
    println!("      --entity-type TYPE   Entity type (e.g. data_product)");
    println!("      --entity-id ID       Entity identifier");
    println!("      --entity-name NAME   Display name of the entity");
    println!("      --actor EMAIL        User triggering the run");
    println!("  resume <EXECUTION_ID>    Resolve a paused step and continue");
    println!("      --approve | --reject Decision for the paused step");
    println!("      --data JSON          Extra result data (object)");
    println!("  show <EXECUTION_ID>      Print an execution and its timeline");
    println!("  list                     List recorded executions");
    println!("  validate <WORKFLOW_FILE> Lint a workflow definition");
    println!();
    println!("Options:");
    println!("  --config FILE            Engine config (default: procflow.yaml if present)");
    println!("  --data-dir PATH          Directory for executions, workflows and policies");
    println!("  --verbose                Enable debug logging");
    println!("  --help                   Show this help message");
    println!("  --version                Show version information");
    println!();
    println!("Examples:");
    println!("  procflow run review.yaml --entity dp.json --entity-type data_product --entity-id dp-1");
    println!("  procflow resume <EXECUTION_ID> --reject --data '{{\"message\": \"Missing docs\"}}'");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut positionals: Vec<String> = Vec::new();
    let mut options = CommandOptions::default();
    let mut config_path = None;
    let mut data_dir = None;
    let mut verbose = false;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--approve" | "--reject" => {
                let approve = arg == "--approve";
                if options.decision.is_some_and(|d| d != approve) {
                    return Err("--approve and --reject are mutually exclusive".to_string());
                }
                options.decision = Some(approve);
            }
            "--config" | "--data-dir" | "--entity" | "--entity-type" | "--entity-id"
            | "--entity-name" | "--actor" | "--data" => {
                i += 1;
                let value = args
                    .get(i)
                    .cloned()
                    .ok_or_else(|| format!("{} requires a value", arg))?;
                match arg.as_str() {
                    "--config" => config_path = Some(PathBuf::from(value)),
                    "--data-dir" => data_dir = Some(PathBuf::from(value)),
                    "--entity" => options.entity = Some(value),
                    "--entity-type" => options.entity_type = Some(value),
                    "--entity-id" => options.entity_id = Some(value),
                    "--entity-name" => options.entity_name = Some(value),
                    "--actor" => options.actor = Some(value),
                    _ => options.data = Some(value),
                }
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => positionals.push(arg.clone()),
        }
        i += 1;
    }

    Ok(Config {
        command: build_command(positionals, options)?,
        config_path,
        data_dir,
        verbose,
    })
}

fn build_command(positionals: Vec<String>, options: CommandOptions) -> Result<Command, String> {
    let mut positionals = positionals.into_iter();
    let name = positionals.next().ok_or("No command given")?;
    let mut operand = |what: &str| {
        positionals
            .next()
            .ok_or_else(|| format!("{} requires {}", name, what))
    };

    let command = match name.as_str() {
        "run" => {
            let workflow_path = PathBuf::from(operand("a workflow file")?);
            let required = |value: Option<String>, flag: &str| {
                value.ok_or_else(|| format!("run requires {}", flag))
            };
            Command::Run {
                workflow_path,
                entity_path: PathBuf::from(required(options.entity, "--entity")?),
                entity_type: required(options.entity_type, "--entity-type")?,
                entity_id: required(options.entity_id, "--entity-id")?,
                entity_name: options.entity_name,
                actor: options.actor,
            }
        }
        "resume" => Command::Resume {
            execution_id: operand("an execution id")?,
            approve: options
                .decision
                .ok_or("resume requires --approve or --reject")?,
            data: options.data,
        },
        "show" => Command::Show {
            execution_id: operand("an execution id")?,
        },
        "list" => Command::List,
        "validate" => Command::Validate {
            workflow_path: PathBuf::from(operand("a workflow file")?),
        },
        other => return Err(format!("Unknown command: {}", other)),
    };

    if let Some(extra) = positionals.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }
    Ok(command)
}

fn paint_status(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Succeeded => status.as_str().green().bold(),
        ExecutionStatus::Failed => status.as_str().red().bold(),
        ExecutionStatus::Paused => status.as_str().yellow().bold(),
        ExecutionStatus::Running => status.as_str().cyan(),
    }
}

/// Parses a JSON object from text.
fn parse_object(text: &str, what: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("{} must be a JSON object", what)),
        Err(e) => Err(format!("{} is not valid JSON: {}", what, e)),
    }
}

fn print_summary(execution: &WorkflowExecution) {
    println!();
    println!("Execution {}", execution.id.bold());
    println!(
        "  Workflow:  {} ({})",
        execution.workflow_name, execution.workflow_id
    );
    match &execution.entity_name {
        Some(name) => println!(
            "  Entity:    {} '{}' ({})",
            execution.entity_type, execution.entity_id, name
        ),
        None => println!(
            "  Entity:    {} '{}'",
            execution.entity_type, execution.entity_id
        ),
    }
    println!("  Status:    {}", paint_status(execution.status));
    println!(
        "  Steps:     {} run, {} passed, {} failed",
        execution.steps_dispatched(),
        execution.success_count,
        execution.failure_count
    );
    if let Some(step_id) = &execution.current_step_id {
        println!("  Waiting:   step '{}'", step_id);
    }
    if let Some(message) = &execution.error_message {
        println!("  Error:     {}", message.red());
    }
}

fn print_steps(execution: &WorkflowExecution) {
    println!();
    println!("Steps:");
    for (index, record) in execution.step_executions.iter().enumerate() {
        let verdict = if record.passed {
            "passed".green()
        } else {
            "failed".red()
        };
        let detail = record
            .error_message
            .as_deref()
            .or(record.message.as_deref())
            .unwrap_or("");
        let marker = if record.blocking { " (paused)" } else { "" };
        println!(
            "  {:>3}. {:16} {}{} {:>8.1} ms  {}",
            index + 1,
            record.step_id,
            verdict,
            marker,
            record.duration_ms,
            detail
        );
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let cli = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(cli.verbose);
    print_banner();

    let mut config = EngineConfig::load(cli.config_path.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    if let Command::Validate { workflow_path } = &cli.command {
        let workflow = load_workflow(workflow_path)?;
        let issues = validate_workflow(&workflow);
        if issues.is_empty() {
            println!("{} '{}' is valid", "OK".green().bold(), workflow.id);
            return Ok(());
        }
        for issue in &issues {
            if issue.is_error() {
                println!("  {} {}", "error:".red().bold(), issue);
            } else {
                println!("  {} {}", "warning:".yellow().bold(), issue);
            }
        }
        let errors = issues.iter().filter(|i| i.is_error()).count();
        if errors > 0 {
            return Err(format!("Workflow '{}' has {} error(s)", workflow.id, errors).into());
        }
        return Ok(());
    }

    info!("Data directory: {}", config.data_dir.display());
    let executions = Arc::new(FileExecutionStore::open(&config.data_dir)?);
    let workflows = Arc::new(FileWorkflowStore::open(&config.data_dir)?);
    let policies = InMemoryPolicyStore::load(config.policies_path())?;

    let mut engine = Engine::from_config(&config, executions, workflows.clone());
    engine.set_services(HandlerServices::from_config(&config).with_policies(Arc::new(policies)));

    match cli.command {
        Command::Run {
            workflow_path,
            entity_path,
            entity_type,
            entity_id,
            entity_name,
            actor,
        } => {
            info!("Loading workflow: {}", workflow_path.display());
            let workflow = load_workflow(&workflow_path).map_err(|e| {
                error!("Failed to load workflow: {}", e);
                format!(
                    "Could not load workflow from '{}': {}",
                    workflow_path.display(),
                    e
                )
            })?;
            workflows.save(&workflow)?;

            let content = fs::read_to_string(&entity_path).map_err(|e| {
                format!("Could not read entity file '{}': {}", entity_path.display(), e)
            })?;
            let entity = parse_object(&content, "Entity file")?;

            let mut trigger = TriggerContext::new("manual");
            trigger.user_email = actor.clone();
            let mut request = RunRequest::new(entity_type, entity_id, entity).with_trigger(trigger);
            if let Some(name) = entity_name {
                request = request.with_entity_name(name);
            }
            if let Some(email) = actor {
                request = request.with_actor(email);
            }

            let execution = engine.run(&workflow, request)?;
            print_summary(&execution);
        }
        Command::Resume {
            execution_id,
            approve,
            data,
        } => {
            let data = data
                .map(|text| parse_object(&text, "--data"))
                .transpose()?;
            let execution = engine.resume(&execution_id, approve, data)?;
            print_summary(&execution);
        }
        Command::Show { execution_id } => {
            let execution = engine
                .get_execution(&execution_id)?
                .ok_or(EngineError::ExecutionNotFound(execution_id))?;
            print_summary(&execution);
            if !execution.step_executions.is_empty() {
                print_steps(&execution);
                print!("{}", ExecutionTimeline::from_execution(&execution).gantt_chart());
            }
        }
        Command::List => {
            let all = engine.list_executions()?;
            if all.is_empty() {
                println!("No executions recorded in {}", config.data_dir.display());
            }
            for execution in &all {
                println!(
                    "{}  {:10}  {:24}  {} '{}'  {}",
                    execution.id,
                    paint_status(execution.status),
                    execution.workflow_name,
                    execution.entity_type,
                    execution.entity_id,
                    execution.started_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Command::Validate { .. } => {}
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("procflow")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_run() {
        let config = parse_arguments(&args(&[
            "run",
            "review.yaml",
            "--entity",
            "dp.json",
            "--entity-type",
            "data_product",
            "--entity-id",
            "dp-1",
            "--actor",
            "a@x.com",
            "--data-dir",
            "/tmp/pf",
            "-v",
        ]))
        .unwrap();

        assert!(config.verbose);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/pf")));
        assert_eq!(
            config.command,
            Command::Run {
                workflow_path: PathBuf::from("review.yaml"),
                entity_path: PathBuf::from("dp.json"),
                entity_type: "data_product".to_string(),
                entity_id: "dp-1".to_string(),
                entity_name: None,
                actor: Some("a@x.com".to_string()),
            }
        );
    }

    #[test]
    fn test_run_requires_entity_flags() {
        let err = parse_arguments(&args(&["run", "review.yaml", "--entity", "dp.json"])).unwrap_err();
        assert_eq!(err, "run requires --entity-type");
    }

    #[test]
    fn test_parse_resume() {
        let config =
            parse_arguments(&args(&["resume", "exec-1", "--reject", "--data", "{}"])).unwrap();
        assert_eq!(
            config.command,
            Command::Resume {
                execution_id: "exec-1".to_string(),
                approve: false,
                data: Some("{}".to_string()),
            }
        );

        assert!(parse_arguments(&args(&["resume", "exec-1"])).is_err());
        assert!(parse_arguments(&args(&["resume", "exec-1", "--approve", "--reject"])).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_arguments(&args(&[])).unwrap_err(), "No command given");
        assert_eq!(
            parse_arguments(&args(&["launch"])).unwrap_err(),
            "Unknown command: launch"
        );
        assert_eq!(
            parse_arguments(&args(&["list", "extra"])).unwrap_err(),
            "Unexpected argument: extra"
        );
        assert_eq!(
            parse_arguments(&args(&["list", "--bogus"])).unwrap_err(),
            "Unknown option: --bogus"
        );
        assert_eq!(
            parse_arguments(&args(&["show"])).unwrap_err(),
            "show requires an execution id"
        );
    }

    #[test]
    fn test_parse_object() {
        assert_eq!(parse_object(r#"{"a": 1}"#, "x").unwrap()["a"], 1);
        assert_eq!(parse_object("[1]", "x").unwrap_err(), "x must be a JSON object");
        assert!(parse_object("{", "x").is_err());
    }
}
